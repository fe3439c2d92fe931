use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hellogoodbye_corpus::config::{AnnotatorKind, Config, TranslateProvider, TtsProvider};
use hellogoodbye_corpus::corpus::{Checkpointer, CorpusStore};
use hellogoodbye_corpus::languages::{parse_language_list, LanguageRegistry};
use hellogoodbye_corpus::pipeline::{Pipeline, PipelineSettings};
use hellogoodbye_corpus::stats::StatsReport;
use hellogoodbye_corpus::validate::CorpusValidator;
use hellogoodbye_corpus::words::{default_words, load_words};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Build the HelloGoodbye word corpus: translations, pronunciation
/// annotations and audio files.
#[derive(Parser, Debug)]
#[command(name = "hellogoodbye-corpus")]
#[command(version)]
#[command(about = "Generate the HelloGoodbye corpus and pronunciation audio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a fresh corpus from a word list
    Create {
        /// Word list, one word per line (defaults to WORDS_FILE or the built-in list)
        #[arg(long)]
        words: Option<PathBuf>,

        /// Annotation to add while translating
        #[arg(long, value_enum)]
        annotator: Option<AnnotatorKind>,

        /// Translation provider
        #[arg(long, value_enum)]
        provider: Option<TranslateProvider>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Add missing languages to an existing corpus
    Translate {
        /// Re-translate languages that are already present
        #[arg(long)]
        overwrite: bool,

        /// Annotation to add while translating
        #[arg(long, value_enum)]
        annotator: Option<AnnotatorKind>,

        /// Translation provider
        #[arg(long, value_enum)]
        provider: Option<TranslateProvider>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Add respellings (or IPA) to languages already in the corpus
    #[command(visible_alias = "annotate")]
    Respell {
        /// Replace annotations that are already present
        #[arg(long)]
        overwrite: bool,

        /// Annotation to add
        #[arg(long, value_enum, default_value_t = AnnotatorKind::Respelling)]
        annotator: AnnotatorKind,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Download pronunciation audio for every translated word
    Audio {
        /// Speech provider
        #[arg(long, value_enum)]
        tts: Option<TtsProvider>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Check the corpus against the audio directory
    Validate {
        /// Corpus file (defaults to CORPUS_PATH)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Audio directory (defaults to AUDIO_DIR)
        #[arg(long)]
        audio_dir: Option<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// List the supported languages
    Languages,
}

/// Options shared by the passes that rewrite the corpus.
#[derive(Args, Debug)]
struct RunArgs {
    /// Corpus to read (defaults to CORPUS_PATH)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Corpus to write (defaults to --input)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Comma separated language codes (defaults to TARGET_LANGS)
    #[arg(long)]
    langs: Option<String>,

    /// Seconds to sleep after each successful translation
    #[arg(long)]
    sleep: Option<f64>,

    /// Attempts per provider call
    #[arg(long)]
    retries: Option<u32>,

    /// Languages processed in parallel per entry
    #[arg(long)]
    concurrency: Option<usize>,

    /// Save the corpus every N entries (0 saves only at the end)
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Audio directory (defaults to AUDIO_DIR)
    #[arg(long)]
    audio_dir: Option<PathBuf>,

    /// Stop at the first failed word
    #[arg(long)]
    fail_fast: bool,

    /// Write the run statistics as JSON to this file
    #[arg(long, env = "RUN_REPORT")]
    report: Option<PathBuf>,
}

impl RunArgs {
    /// Apply the flags on top of the environment configuration.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(input) = &self.input {
            config.corpus_path = input.clone();
        }
        if let Some(langs) = &self.langs {
            config.target_langs = parse_language_list(langs).context("Invalid --langs")?;
        }
        if let Some(sleep) = self.sleep {
            config.sleep_between = Duration::from_secs_f64(sleep.max(0.0));
        }
        if let Some(retries) = self.retries {
            config.retries = retries.max(1);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        if let Some(every) = self.checkpoint_every {
            config.checkpoint_every = every;
        }
        if let Some(audio_dir) = &self.audio_dir {
            config.audio_dir = audio_dir.clone();
        }
        config.fail_fast |= self.fail_fast;
        Ok(())
    }

    fn output_path(&self, config: &Config) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| config.corpus_path.clone())
    }

    fn checkpointer(&self, config: &Config) -> Checkpointer {
        Checkpointer::new(
            CorpusStore::new(self.output_path(config)),
            config.checkpoint_every,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hellogoodbye_corpus=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Create {
            words,
            annotator,
            provider,
            run,
        } => {
            run.apply(&mut config)?;
            if let Some(provider) = provider {
                config.translate_provider = provider;
            }
            let words = match words.or_else(|| config.words_file.clone()) {
                Some(path) => load_words(&path)?,
                None => default_words(),
            };

            let pipeline = Pipeline::new(PipelineSettings::from_config(&config))
                .with_translator(config.translator()?)
                .with_annotator(config.annotator_of(annotator.unwrap_or(config.annotator))?);
            let mut checkpointer = run.checkpointer(&config);
            let (corpus, report) = pipeline
                .create(&words, &config.target_langs, &mut checkpointer)
                .await?;

            info!(
                "Wrote {} entries to {}",
                corpus.len(),
                run.output_path(&config).display()
            );
            finish_run(&report, run.report.as_deref())
        }

        Command::Translate {
            overwrite,
            annotator,
            provider,
            run,
        } => {
            run.apply(&mut config)?;
            if let Some(provider) = provider {
                config.translate_provider = provider;
            }
            let mut corpus = CorpusStore::new(&config.corpus_path).load_existing()?;
            info!(
                "Loaded {} entries from {}",
                corpus.len(),
                config.corpus_path.display()
            );

            let pipeline = Pipeline::new(PipelineSettings::from_config(&config))
                .with_translator(config.translator()?)
                .with_annotator(config.annotator_of(annotator.unwrap_or(config.annotator))?);
            let mut checkpointer = run.checkpointer(&config);
            let report = pipeline
                .add_translations(&mut corpus, &config.target_langs, overwrite, &mut checkpointer)
                .await?;
            finish_run(&report, run.report.as_deref())
        }

        Command::Respell {
            overwrite,
            annotator,
            run,
        } => {
            run.apply(&mut config)?;
            let mut corpus = CorpusStore::new(&config.corpus_path).load_existing()?;

            let pipeline = Pipeline::new(PipelineSettings::from_config(&config))
                .with_annotator(config.annotator_of(annotator)?);
            let mut checkpointer = run.checkpointer(&config);
            let report = pipeline
                .add_annotations(&mut corpus, &config.target_langs, overwrite, &mut checkpointer)
                .await?;
            finish_run(&report, run.report.as_deref())
        }

        Command::Audio { tts, run } => {
            run.apply(&mut config)?;
            if let Some(tts) = tts {
                config.tts_provider = tts;
            }
            let mut corpus = CorpusStore::new(&config.corpus_path).load_existing()?;

            let pipeline = Pipeline::new(PipelineSettings::from_config(&config))
                .with_synthesizer(config.synthesizer()?);
            let mut checkpointer = run.checkpointer(&config);
            // Without --langs every language in the corpus gets audio
            let only = run.langs.as_ref().map(|_| config.target_langs.as_slice());
            let report = pipeline
                .add_audio(&mut corpus, only, &mut checkpointer)
                .await?;
            info!("Audio files in {}", config.audio_dir.display());
            finish_run(&report, run.report.as_deref())
        }

        Command::Validate {
            input,
            audio_dir,
            strict,
        } => {
            let path = input.unwrap_or(config.corpus_path);
            let audio_dir = audio_dir.unwrap_or(config.audio_dir);
            let corpus = CorpusStore::new(&path).load_existing()?;
            let report = CorpusValidator::validate(&corpus, &audio_dir)?;

            for warning in &report.warnings {
                warn!("{}", warning);
            }
            for error in &report.errors {
                tracing::error!("{}", error);
            }
            info!(
                "{}: {} entries, {} errors, {} warnings",
                path.display(),
                corpus.len(),
                report.errors.len(),
                report.warnings.len()
            );

            if report.has_errors() || (strict && report.has_warnings()) {
                bail!("Corpus validation failed");
            }
            Ok(())
        }

        Command::Languages => {
            for language in LanguageRegistry::get().list_all() {
                let marker = if language.is_source {
                    "source"
                } else if language.default_target {
                    "default"
                } else {
                    ""
                };
                println!(
                    "{:<6} {:<12} espeak={:<6} speech={:<6} {}",
                    language.code, language.name, language.espeak_voice, language.speech_code, marker
                );
            }
            Ok(())
        }
    }
}

/// Log the summary, write the JSON report if asked, and fail the process
/// when any word failed.
fn finish_run(report: &StatsReport, report_path: Option<&Path>) -> Result<()> {
    info!("{}", report.summary());

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if report.has_failures() {
        bail!("{} operations failed", report.failures);
    }
    Ok(())
}
