//! Preview one word - translate, annotate and synthesize it without touching
//! the corpus.
//!
//! Usage:
//!   cargo run --bin preview -- "thank you" --lang ja
//!   cargo run --bin preview -- water --lang fr --annotator respelling --out-dir /tmp
//!
//! Uses the same environment variables as the main binary
//! (TRANSLATE_PROVIDER, TTS_PROVIDER, GEMINI_API_KEY, ...).

use anyhow::{Context, Result};
use clap::Parser;
use hellogoodbye_corpus::annotate::Annotator;
use hellogoodbye_corpus::config::{AnnotatorKind, Config};
use hellogoodbye_corpus::languages::Language;
use hellogoodbye_corpus::translate::Translator;
use hellogoodbye_corpus::tts::{audio_filename, save_audio, Synthesizer};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "preview")]
#[command(about = "Translate, annotate and pronounce a single word")]
struct PreviewArgs {
    /// English word or phrase
    word: String,

    /// Target language code
    #[arg(short, long, default_value = "es")]
    lang: String,

    /// Annotation to show (defaults to ANNOTATOR)
    #[arg(long, value_enum)]
    annotator: Option<AnnotatorKind>,

    /// Directory for the MP3 file
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Skip audio synthesis
    #[arg(long)]
    no_audio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hellogoodbye_corpus=info".parse()?)
                .add_directive("preview=info".parse()?),
        )
        .init();

    let args = PreviewArgs::parse();
    let config = Config::from_env()?;
    let language = Language::from_code(&args.lang)?;

    info!("Translating '{}' into {} ({})", args.word, language.name(), language);
    let translator = config.translator()?;
    let translation = translator
        .translate(&args.word, Language::source(), language)
        .await
        .with_context(|| format!("{} failed", translator.name()))?;

    println!("\n{}", "=".repeat(60));
    println!("{} -> {} [{}]", args.word, translation.text, language);
    if let Some(pronunciation) = &translation.pronunciation {
        println!("google_pronunciation: {}", pronunciation);
    }

    let annotator = config.annotator_of(args.annotator.unwrap_or(config.annotator))?;
    match annotator.annotate(&translation.text, language).await {
        Ok(Some(annotation)) => println!("{}: {:?}", annotator.name(), annotation),
        Ok(None) => println!("{}: (none)", annotator.name()),
        Err(e) => warn!("{} failed: {}", annotator.name(), e),
    }

    if !args.no_audio {
        let synthesizer = config.synthesizer()?;
        let bytes = synthesizer
            .synthesize(&translation.text, language)
            .await
            .with_context(|| format!("{} failed", synthesizer.name()))?;
        let path = args
            .out_dir
            .join(audio_filename(&args.word, language.code(), &translation.text));
        save_audio(&path, &bytes)?;
        println!("audio: {} ({} bytes)", path.display(), bytes.len());
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
