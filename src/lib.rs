pub mod annotate;
pub mod chat;
pub mod config;
pub mod corpus;
pub mod errors;
pub mod languages;
pub mod pipeline;
pub mod retry;
pub mod stats;
pub mod translate;
pub mod tts;
pub mod validate;
pub mod words;
