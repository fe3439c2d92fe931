//! The word × language passes that build and enrich the corpus.
//!
//! Entries are processed in order and checkpointed as they complete, so a
//! saved corpus always holds a prefix of finished entries. The languages of
//! one entry fan out up to `concurrency` at a time.

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::annotate::{Annotator, NoAnnotator};
use crate::config::Config;
use crate::corpus::{Checkpointer, Corpus, LanguageResult};
use crate::errors::ProviderError;
use crate::languages::Language;
use crate::retry::{with_retry_if, RetryConfig};
use crate::stats::{RunStats, StatsReport};
use crate::translate::Translator;
use crate::tts::{audio_filename, save_audio, Synthesizer};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source: Language,
    pub concurrency: usize,
    /// Pause after each successful translation
    pub sleep_between: Duration,
    /// Pause after each synthesized audio file
    pub audio_delay: Duration,
    pub translation_retry: RetryConfig,
    pub audio_retry: RetryConfig,
    pub fail_fast: bool,
    pub audio_dir: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source: Language::source(),
            concurrency: config.concurrency.max(1),
            sleep_between: config.sleep_between,
            audio_delay: config.audio_delay,
            translation_retry: config.translation_retry(),
            audio_retry: config.audio_retry(),
            fail_fast: config.fail_fast,
            audio_dir: config.audio_dir.clone(),
        }
    }
}

pub struct Pipeline {
    translator: Option<Box<dyn Translator>>,
    annotator: Box<dyn Annotator>,
    synthesizer: Option<Box<dyn Synthesizer>>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// A pipeline with no providers. Attach the ones the pass needs.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            translator: None,
            annotator: Box::new(NoAnnotator),
            synthesizer: None,
            settings,
        }
    }

    pub fn with_translator(mut self, translator: Box<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_annotator(mut self, annotator: Box<dyn Annotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Box<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    fn translator(&self) -> Result<&dyn Translator> {
        self.translator
            .as_deref()
            .context("No translation provider configured")
    }

    fn synthesizer(&self) -> Result<&dyn Synthesizer> {
        self.synthesizer
            .as_deref()
            .context("No speech provider configured")
    }

    /// Build a fresh corpus: every word translated into every language.
    pub async fn create(
        &self,
        words: &[String],
        langs: &[Language],
        checkpointer: &mut Checkpointer,
    ) -> Result<(Corpus, StatsReport)> {
        let mut corpus = Corpus::from_words(words);
        info!(
            "Creating corpus: {} words x {} languages",
            corpus.len(),
            langs.len()
        );
        let report = self
            .add_translations(&mut corpus, langs, true, checkpointer)
            .await?;
        Ok((corpus, report))
    }

    /// Translate (and annotate) `langs` for every entry. Languages already on
    /// an entry are skipped unless `overwrite` is set.
    pub async fn add_translations(
        &self,
        corpus: &mut Corpus,
        langs: &[Language],
        overwrite: bool,
        checkpointer: &mut Checkpointer,
    ) -> Result<StatsReport> {
        let translator = self.translator()?;
        let stats = RunStats::new();
        let total = corpus.len();

        for index in 0..total {
            let entry = &corpus.entries()[index];
            let original = entry.original().to_string();
            if original.trim().is_empty() {
                warn!("[{}/{}] Entry without original, skipping", index + 1, total);
                continue;
            }

            let mut work = Vec::new();
            for &language in langs {
                if entry.has_language(language) && !overwrite {
                    stats.record_skipped();
                    continue;
                }
                work.push((language, entry.language(language.code()).cloned()));
            }

            if work.is_empty() {
                debug!("[{}/{}] {}: nothing to translate", index + 1, total, original);
            } else {
                info!(
                    "[{}/{}] Translating '{}' into {} languages",
                    index + 1,
                    total,
                    original,
                    work.len()
                );
            }

            let stats_ref = &stats;
            let original_ref = original.as_str();
            let outcomes: Vec<_> = stream::iter(work)
                .map(|(language, previous)| async move {
                    let outcome = self
                        .translate_one(translator, original_ref, language, previous, stats_ref)
                        .await;
                    (language, outcome)
                })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;

            let mut failed = false;
            for (language, outcome) in outcomes {
                match outcome {
                    Ok(result) => {
                        stats.record_translated();
                        if let Some(entry) = corpus.entry_mut(index) {
                            entry.set_language(language, result);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to translate '{}' into {}: {}", original, language, e);
                        stats.record_failure();
                        failed = true;
                    }
                }
            }

            self.entry_finished(corpus, index, &original, failed, checkpointer, &stats)?;
        }

        checkpointer.finish(corpus)?;
        stats.record_checkpoint();
        let report = stats.report();
        info!("Translation pass done: {}", report.summary());
        Ok(report)
    }

    async fn translate_one(
        &self,
        translator: &dyn Translator,
        original: &str,
        language: Language,
        previous: Option<LanguageResult>,
        stats: &RunStats,
    ) -> Result<LanguageResult, ProviderError> {
        let operation = format!("Translate '{}' into {}", original, language);
        let translation = with_retry_if(
            &self.settings.translation_retry,
            &operation,
            || translator.translate(original, self.settings.source, language),
            ProviderError::is_retryable,
        )
        .await?;

        let mut result = LanguageResult::translated(translation.text);
        result.google_pronunciation = translation.pronunciation;

        if !self.annotator.already_annotated(&result) {
            self.annotate_into(&mut result, language, stats).await;
        }

        if let Some(previous) = previous {
            carry_over(previous, &mut result);
        }

        if !self.settings.sleep_between.is_zero() {
            sleep(self.settings.sleep_between).await;
        }
        Ok(result)
    }

    /// Annotate during translation. A failing annotator leaves the result
    /// without annotation; the translation is kept.
    async fn annotate_into(&self, result: &mut LanguageResult, language: Language, stats: &RunStats) {
        let Some(text) = result.spoken().map(str::to_string) else {
            return;
        };
        match self.annotator.annotate(&text, language).await {
            Ok(Some(annotation)) => {
                annotation.apply_to(result);
                stats.record_annotated();
            }
            Ok(None) => {
                debug!("{}: no annotation for '{}'", self.annotator.name(), text);
                stats.record_annotation_miss();
            }
            Err(e) => {
                warn!("{} failed for '{}' ({}): {}", self.annotator.name(), text, language, e);
                stats.record_annotation_miss();
            }
        }
    }

    /// Add the configured annotation to language results that already exist.
    /// Results that carry it are skipped unless `overwrite` is set.
    pub async fn add_annotations(
        &self,
        corpus: &mut Corpus,
        langs: &[Language],
        overwrite: bool,
        checkpointer: &mut Checkpointer,
    ) -> Result<StatsReport> {
        let stats = RunStats::new();
        let total = corpus.len();

        for index in 0..total {
            let entry = &corpus.entries()[index];
            let original = entry.original().to_string();
            if original.trim().is_empty() {
                continue;
            }

            let mut work = Vec::new();
            for &language in langs {
                let Some(result) = entry.language(language.code()) else {
                    continue;
                };
                let Some(text) = result.spoken() else {
                    stats.record_skipped();
                    continue;
                };
                if self.annotator.already_annotated(result) && !overwrite {
                    stats.record_skipped();
                    continue;
                }
                work.push((language, text.to_string()));
            }

            if !work.is_empty() {
                info!(
                    "[{}/{}] {}: annotating {} languages with {}",
                    index + 1,
                    total,
                    original,
                    work.len(),
                    self.annotator.name()
                );
            }

            let annotator = self.annotator.as_ref();
            let outcomes: Vec<_> = stream::iter(work)
                .map(|(language, text)| async move {
                    let outcome = annotator.annotate(&text, language).await;
                    (language, text, outcome)
                })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;

            let mut failed = false;
            for (language, text, outcome) in outcomes {
                match outcome {
                    Ok(Some(annotation)) => {
                        if let Some(result) = corpus
                            .entry_mut(index)
                            .and_then(|e| e.language_mut(language.code()))
                        {
                            annotation.apply_to(result);
                        }
                        stats.record_annotated();
                    }
                    Ok(None) => {
                        debug!("{}: no annotation for '{}'", annotator.name(), text);
                        stats.record_annotation_miss();
                    }
                    Err(e) => {
                        warn!("Failed to annotate '{}' ({}): {}", text, language, e);
                        stats.record_failure();
                        failed = true;
                    }
                }
            }

            self.entry_finished(corpus, index, &original, failed, checkpointer, &stats)?;
        }

        checkpointer.finish(corpus)?;
        stats.record_checkpoint();
        let report = stats.report();
        info!("Annotation pass done: {}", report.summary());
        Ok(report)
    }

    /// Make sure every translated word has its audio file. Existing files are
    /// reused, so re-runs only download what is missing. `only` limits the
    /// pass to some languages.
    pub async fn add_audio(
        &self,
        corpus: &mut Corpus,
        only: Option<&[Language]>,
        checkpointer: &mut Checkpointer,
    ) -> Result<StatsReport> {
        let synthesizer = self.synthesizer()?;
        let stats = RunStats::new();
        let total = corpus.len();
        std::fs::create_dir_all(&self.settings.audio_dir).with_context(|| {
            format!(
                "Failed to create audio directory {}",
                self.settings.audio_dir.display()
            )
        })?;

        for index in 0..total {
            let entry = &corpus.entries()[index];
            let original = entry.original().to_string();
            if original.trim().is_empty() {
                continue;
            }

            let mut work = Vec::new();
            for (code, result) in entry.languages() {
                let Ok(language) = Language::from_code(code) else {
                    warn!("{}: unknown language '{}', no audio", original, code);
                    stats.record_skipped();
                    continue;
                };
                if only.is_some_and(|langs| !langs.contains(&language)) {
                    continue;
                }
                let Some(word) = result.spoken() else {
                    stats.record_skipped();
                    continue;
                };
                work.push((code.to_string(), language, word.to_string()));
            }

            debug!("[{}/{}] {}: {} audio files", index + 1, total, original, work.len());

            let stats_ref = &stats;
            let original_ref = original.as_str();
            let outcomes: Vec<_> = stream::iter(work)
                .map(|(key, language, word)| async move {
                    let outcome = self
                        .audio_one(synthesizer, original_ref, &key, language, &word, stats_ref)
                        .await;
                    (key, language, word, outcome)
                })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;

            let mut failed = false;
            for (key, language, word, outcome) in outcomes {
                let Some(result) = corpus.entry_mut(index).and_then(|e| e.language_mut(&key))
                else {
                    continue;
                };
                match outcome {
                    Ok(filename) => result.audio = Some(filename),
                    Err(e) => {
                        warn!("Failed to get audio for '{}' ({}): {:#}", word, language, e);
                        stats.record_failure();
                        failed = true;
                        let stale = result
                            .audio
                            .as_ref()
                            .is_some_and(|name| !self.settings.audio_dir.join(name).exists());
                        if stale {
                            result.audio = None;
                        }
                    }
                }
            }

            self.entry_finished(corpus, index, &original, failed, checkpointer, &stats)?;
        }

        checkpointer.finish(corpus)?;
        stats.record_checkpoint();
        let report = stats.report();
        info!("Audio pass done: {}", report.summary());
        Ok(report)
    }

    async fn audio_one(
        &self,
        synthesizer: &dyn Synthesizer,
        original: &str,
        key: &str,
        language: Language,
        word: &str,
        stats: &RunStats,
    ) -> Result<String> {
        // Named after the key as written in the corpus
        let filename = audio_filename(original, key, word);
        let path = self.settings.audio_dir.join(&filename);
        if path.exists() {
            debug!("Audio exists: {}", filename);
            stats.record_audio_reused();
            return Ok(filename);
        }

        let operation = format!("Synthesize '{}' ({})", word, language);
        let bytes = with_retry_if(
            &self.settings.audio_retry,
            &operation,
            || synthesizer.synthesize(word, language),
            ProviderError::is_retryable,
        )
        .await?;
        save_audio(&path, &bytes)?;
        stats.record_audio_synthesized();
        info!("Downloaded {}", filename);

        if !self.settings.audio_delay.is_zero() {
            sleep(self.settings.audio_delay).await;
        }
        Ok(filename)
    }

    fn entry_finished(
        &self,
        corpus: &Corpus,
        index: usize,
        original: &str,
        failed: bool,
        checkpointer: &mut Checkpointer,
        stats: &RunStats,
    ) -> Result<()> {
        if failed && self.settings.fail_fast {
            checkpointer.finish(corpus)?;
            stats.record_checkpoint();
            bail!(
                "Stopping at entry {} ('{}') after a failure (fail-fast)",
                index + 1,
                original
            );
        }
        if checkpointer.entry_done(corpus, index + 1)? {
            stats.record_checkpoint();
        }
        Ok(())
    }
}

/// Keep what a re-translation does not produce: fields from other tools, and
/// audio plus annotations when the word itself did not change.
fn carry_over(previous: LanguageResult, fresh: &mut LanguageResult) {
    let same_word = previous.spoken() == fresh.spoken();
    let LanguageResult {
        ipa,
        respelling,
        audio,
        extra,
        ..
    } = previous;

    for (key, value) in extra {
        fresh.extra.entry(key).or_insert(value);
    }
    if same_word {
        fresh.ipa = fresh.ipa.take().or(ipa);
        fresh.respelling = fresh.respelling.take().or(respelling);
        fresh.audio = fresh.audio.take().or(audio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotation;
    use crate::corpus::CorpusStore;
    use crate::languages::LanguageRegistry;
    use crate::translate::Translation;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // ==================== Fakes ====================

    /// Translates to `"{code}:{text}"`. Fails permanently for `broken`
    /// languages and with a 503 for the first `flaky` calls.
    #[derive(Default)]
    struct FakeTranslator {
        calls: Arc<AtomicUsize>,
        broken: Vec<&'static str>,
        flaky: usize,
    }

    #[async_trait]
    impl Translator for FakeTranslator {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn translate(
            &self,
            text: &str,
            _source: Language,
            target: Language,
        ) -> Result<Translation, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.flaky {
                return Err(ProviderError::Api {
                    service: "fake",
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "busy".to_string(),
                });
            }
            if self.broken.contains(&target.code()) {
                return Err(ProviderError::Api {
                    service: "fake",
                    status: StatusCode::BAD_REQUEST,
                    body: "unsupported".to_string(),
                });
            }
            Ok(Translation {
                text: format!("{}:{}", target.code(), text),
                pronunciation: (target.code() == "ja").then(|| "romaji".to_string()),
            })
        }
    }

    struct UpperRespeller {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Annotator for UpperRespeller {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn already_annotated(&self, result: &LanguageResult) -> bool {
            result.respelling.is_some()
        }

        async fn annotate(
            &self,
            text: &str,
            _language: Language,
        ) -> Result<Option<Annotation>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Annotation::Respelling(text.to_uppercase())))
        }
    }

    struct FailingAnnotator;

    #[async_trait]
    impl Annotator for FailingAnnotator {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn already_annotated(&self, result: &LanguageResult) -> bool {
            result.ipa.is_some()
        }

        async fn annotate(&self, _: &str, _: Language) -> Result<Option<Annotation>, ProviderError> {
            Err(ProviderError::Process {
                program: "espeak-ng".to_string(),
                message: "not installed".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct FakeSynthesizer {
        calls: Arc<AtomicUsize>,
        broken: Vec<&'static str>,
    }

    #[async_trait]
    impl Synthesizer for FakeSynthesizer {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.contains(&language.code()) {
                return Err(ProviderError::invalid("fake", "empty audio body"));
            }
            Ok(format!("ID3 {}", text).into_bytes())
        }
    }

    // ==================== Helpers ====================

    fn settings(dir: &std::path::Path) -> PipelineSettings {
        PipelineSettings {
            source: Language::ENGLISH,
            concurrency: 1,
            sleep_between: Duration::ZERO,
            audio_delay: Duration::ZERO,
            translation_retry: RetryConfig::new(3, Duration::from_millis(1)),
            audio_retry: RetryConfig::new(2, Duration::from_millis(1)),
            fail_fast: false,
            audio_dir: dir.join("audio_files"),
        }
    }

    fn langs(codes: &[&str]) -> Vec<Language> {
        codes.iter().map(|c| Language::from_code(c).unwrap()).collect()
    }

    fn checkpointer(dir: &std::path::Path, every: usize) -> Checkpointer {
        Checkpointer::new(CorpusStore::new(dir.join("corpus.json")), every)
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    // ==================== Translation Tests ====================

    #[tokio::test]
    async fn test_create_translates_every_word_and_language() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_translator(Box::new(FakeTranslator {
            calls: calls.clone(),
            ..Default::default()
        }));

        let (corpus, report) = pipeline
            .create(
                &words(&["hello", "water"]),
                &langs(&["en", "es", "ja"]),
                &mut checkpointer(dir.path(), 10),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(report.translated, 6);
        assert_eq!(report.failures, 0);

        let hello = &corpus.entries()[0];
        let es = hello.language("es").unwrap();
        assert_eq!(es.word.as_deref(), Some("es:hello"));
        assert_eq!(es.text.as_deref(), Some("es:hello"));
        assert!(es.google_pronunciation.is_none());
        assert_eq!(
            hello.language("ja").unwrap().google_pronunciation.as_deref(),
            Some("romaji")
        );

        let saved = CorpusStore::new(dir.path().join("corpus.json")).load().unwrap();
        assert_eq!(saved, corpus);
    }

    #[tokio::test]
    async fn test_add_translations_skips_present_languages() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_translator(Box::new(FakeTranslator {
            calls: calls.clone(),
            ..Default::default()
        }));

        let mut corpus = Corpus::from_words(&["hello"]);
        if let Some(entry) = corpus.entry_mut(0) {
            entry.set_language(Language::SPANISH, LanguageResult::translated("hola"));
        }

        let report = pipeline
            .add_translations(
                &mut corpus,
                &langs(&["es", "fr"]),
                false,
                &mut checkpointer(dir.path(), 10),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.skipped, 1);
        let entry = &corpus.entries()[0];
        assert_eq!(entry.language("es").unwrap().word.as_deref(), Some("hola"));
        assert_eq!(entry.language("fr").unwrap().word.as_deref(), Some("fr:hello"));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_extra_fields_and_audio_for_same_word() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path()))
            .with_translator(Box::new(FakeTranslator::default()));

        let mut previous = LanguageResult::translated("es:hello");
        previous.audio = Some("hello_es_eshello.mp3".to_string());
        previous.extra.insert("reviewed".to_string(), serde_json::Value::Bool(true));
        let mut stale = LanguageResult::translated("bonjour");
        stale.audio = Some("hello_fr_bonjour.mp3".to_string());

        let mut corpus = Corpus::from_words(&["hello"]);
        if let Some(entry) = corpus.entry_mut(0) {
            entry.set_language(Language::SPANISH, previous);
            entry.set_language(Language::from_code("fr").unwrap(), stale);
        }

        pipeline
            .add_translations(
                &mut corpus,
                &langs(&["es", "fr"]),
                true,
                &mut checkpointer(dir.path(), 10),
            )
            .await
            .unwrap();

        let entry = &corpus.entries()[0];
        let es = entry.language("es").unwrap();
        assert_eq!(es.audio.as_deref(), Some("hello_es_eshello.mp3"));
        assert_eq!(es.extra.get("reviewed"), Some(&serde_json::Value::Bool(true)));

        let fr = entry.language("fr").unwrap();
        assert_eq!(fr.word.as_deref(), Some("fr:hello"));
        assert!(fr.audio.is_none(), "audio of a different word is dropped");
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_translator(Box::new(FakeTranslator {
            calls: calls.clone(),
            flaky: 2,
            ..Default::default()
        }));

        let mut corpus = Corpus::from_words(&["yes"]);
        let report = pipeline
            .add_translations(&mut corpus, &langs(&["de"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.translated, 1);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn test_failed_language_is_counted_and_pass_continues() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_translator(Box::new(FakeTranslator {
            calls: calls.clone(),
            broken: vec!["ko"],
            ..Default::default()
        }));

        let mut corpus = Corpus::from_words(&["hello", "goodbye"]);
        let report = pipeline
            .add_translations(
                &mut corpus,
                &langs(&["ko", "es"]),
                false,
                &mut checkpointer(dir.path(), 10),
            )
            .await
            .unwrap();

        // 400s are not retried
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.failures, 2);
        assert_eq!(report.translated, 2);
        assert!(report.has_failures());
        for entry in corpus.entries() {
            assert!(!entry.has_language(Language::from_code("ko").unwrap()));
            assert!(entry.has_language(Language::SPANISH));
        }
    }

    #[tokio::test]
    async fn test_fail_fast_checkpoints_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.fail_fast = true;
        let pipeline = Pipeline::new(settings).with_translator(Box::new(FakeTranslator {
            broken: vec!["ko"],
            ..Default::default()
        }));

        let mut corpus = Corpus::from_words(&["hello", "goodbye"]);
        let err = pipeline
            .add_translations(
                &mut corpus,
                &langs(&["es", "ko"]),
                false,
                &mut checkpointer(dir.path(), 10),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("fail-fast"));
        let saved = CorpusStore::new(dir.path().join("corpus.json")).load().unwrap();
        assert!(saved.entries()[0].has_language(Language::SPANISH));
        assert!(!saved.entries()[1].has_language(Language::SPANISH));
    }

    #[tokio::test]
    async fn test_entries_without_original_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_translator(Box::new(FakeTranslator {
            calls: calls.clone(),
            ..Default::default()
        }));

        let mut corpus: Corpus =
            serde_json::from_str(r#"[{"es": {"word": "hola"}}, {"original": "no"}]"#).unwrap();
        pipeline
            .add_translations(&mut corpus, &langs(&["fr"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!corpus.entries()[0].has_language(Language::from_code("fr").unwrap()));
    }

    #[tokio::test]
    async fn test_concurrent_fan_out_translates_all_languages() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.concurrency = 4;
        let pipeline =
            Pipeline::new(settings).with_translator(Box::new(FakeTranslator::default()));

        let all = LanguageRegistry::get().default_targets();
        let mut corpus = Corpus::from_words(&["sorry"]);
        let report = pipeline
            .add_translations(&mut corpus, &all, false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(report.translated, all.len());
        assert_eq!(corpus.entries()[0].language_codes().count(), all.len());
    }

    #[tokio::test]
    async fn test_checkpoints_every_n_entries() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path()))
            .with_translator(Box::new(FakeTranslator::default()));

        let mut corpus = Corpus::from_words(&["a", "b", "c", "d", "e"]);
        let mut checkpointer = checkpointer(dir.path(), 2);
        let report = pipeline
            .add_translations(&mut corpus, &langs(&["es"]), false, &mut checkpointer)
            .await
            .unwrap();

        // after entries 2 and 4, plus the final save
        assert_eq!(report.checkpoints, 3);
        assert_eq!(checkpointer.saves(), 3);
    }

    #[tokio::test]
    async fn test_missing_translator_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path()));
        let mut corpus = Corpus::from_words(&["hello"]);
        let result = pipeline
            .add_translations(&mut corpus, &langs(&["es"]), false, &mut checkpointer(dir.path(), 10))
            .await;
        assert!(result.is_err());
    }

    // ==================== Annotation Tests ====================

    #[tokio::test]
    async fn test_uppercase_language_key_is_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path()))
            .with_translator(Box::new(FakeTranslator {
                calls: calls.clone(),
                ..Default::default()
            }))
            .with_annotator(Box::new(UpperRespeller {
                calls: Arc::new(AtomicUsize::new(0)),
            }));
        let mut corpus: Corpus = serde_json::from_str(
            r#"[{"original": "water", "ES": {"word": "agua", "text": "agua"}}]"#,
        )
        .unwrap();

        let report = pipeline
            .add_translations(&mut corpus, &langs(&["es"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped, 1);

        let report = pipeline
            .add_annotations(&mut corpus, &langs(&["es"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();
        assert_eq!(report.annotated, 1);

        let entry = &corpus.entries()[0];
        assert_eq!(entry.language_codes().collect::<Vec<_>>(), vec!["ES"]);
        assert_eq!(entry.language("ES").unwrap().respelling.as_deref(), Some("AGUA"));
    }

    #[tokio::test]
    async fn test_translation_pass_annotates() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path()))
            .with_translator(Box::new(FakeTranslator::default()))
            .with_annotator(Box::new(UpperRespeller {
                calls: Arc::new(AtomicUsize::new(0)),
            }));

        let mut corpus = Corpus::from_words(&["hello"]);
        let report = pipeline
            .add_translations(&mut corpus, &langs(&["es"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(report.annotated, 1);
        assert_eq!(
            corpus.entries()[0].language("es").unwrap().respelling.as_deref(),
            Some("ES:HELLO")
        );
    }

    #[tokio::test]
    async fn test_annotator_failure_keeps_translation() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path()))
            .with_translator(Box::new(FakeTranslator::default()))
            .with_annotator(Box::new(FailingAnnotator));

        let mut corpus = Corpus::from_words(&["hello"]);
        let report = pipeline
            .add_translations(&mut corpus, &langs(&["es"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(report.translated, 1);
        assert_eq!(report.annotation_misses, 1);
        assert_eq!(report.failures, 0);
        let es = corpus.entries()[0].language("es").unwrap();
        assert_eq!(es.word.as_deref(), Some("es:hello"));
        assert!(es.ipa.is_none());
    }

    #[tokio::test]
    async fn test_add_annotations_skips_annotated_unless_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_annotator(Box::new(UpperRespeller {
            calls: calls.clone(),
        }));

        let mut done = LanguageResult::translated("merci");
        done.respelling = Some("mair-SEE".to_string());
        let mut corpus = Corpus::from_words(&["thank you"]);
        if let Some(entry) = corpus.entry_mut(0) {
            entry.set_language(Language::SPANISH, LanguageResult::translated("gracias"));
            entry.set_language(Language::from_code("fr").unwrap(), done);
        }
        let targets = langs(&["es", "fr", "de"]);

        let report = pipeline
            .add_annotations(&mut corpus, &targets, false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.annotated, 1);
        assert_eq!(report.skipped, 1);
        let entry = &corpus.entries()[0];
        assert_eq!(entry.language("es").unwrap().respelling.as_deref(), Some("GRACIAS"));
        assert_eq!(entry.language("fr").unwrap().respelling.as_deref(), Some("mair-SEE"));
        assert!(!entry.has_language(Language::from_code("de").unwrap()));

        pipeline
            .add_annotations(&mut corpus, &targets, true, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            corpus.entries()[0].language("fr").unwrap().respelling.as_deref(),
            Some("MERCI")
        );
    }

    #[tokio::test]
    async fn test_add_annotations_counts_annotator_errors_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path())).with_annotator(Box::new(FailingAnnotator));

        let mut corpus = Corpus::from_words(&["hello"]);
        if let Some(entry) = corpus.entry_mut(0) {
            entry.set_language(Language::SPANISH, LanguageResult::translated("hola"));
        }

        let report = pipeline
            .add_annotations(&mut corpus, &langs(&["es"]), false, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();
        assert_eq!(report.failures, 1);
    }

    // ==================== Audio Tests ====================

    fn translated_corpus() -> Corpus {
        let mut corpus = Corpus::from_words(&["thank you"]);
        if let Some(entry) = corpus.entry_mut(0) {
            entry.set_language(Language::SPANISH, LanguageResult::translated("gracias"));
            entry.set_language(
                Language::from_code("ja").unwrap(),
                LanguageResult::translated("ありがとう"),
            );
        }
        corpus
    }

    #[tokio::test]
    async fn test_add_audio_downloads_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_synthesizer(Box::new(FakeSynthesizer {
            calls: calls.clone(),
            ..Default::default()
        }));

        let mut corpus = translated_corpus();
        let report = pipeline
            .add_audio(&mut corpus, None, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(report.audio_synthesized, 2);
        let es = corpus.entries()[0].language("es").unwrap();
        assert_eq!(es.audio.as_deref(), Some("thank you_es_gracias.mp3"));
        let bytes = std::fs::read(dir.path().join("audio_files/thank you_es_gracias.mp3")).unwrap();
        assert_eq!(bytes, b"ID3 gracias");
        assert!(dir.path().join("audio_files/thank you_ja_ありがとう.mp3").exists());

        let report = pipeline
            .add_audio(&mut corpus, None, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.audio_reused, 2);
        assert_eq!(report.audio_synthesized, 0);
    }

    #[tokio::test]
    async fn test_add_audio_reuses_files_named_after_original_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("audio_files");
        std::fs::create_dir_all(&audio_dir).unwrap();
        std::fs::write(audio_dir.join("thank you_es_gracias.mp3"), b"ID3 shipped").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_synthesizer(Box::new(FakeSynthesizer {
            calls: calls.clone(),
            ..Default::default()
        }));
        let mut corpus: Corpus = serde_json::from_str(
            r#"[{"original": "thank you", "es": {"word": "gracias", "audio": "thank you_es_gracias.mp3"}}]"#,
        )
        .unwrap();

        let report = pipeline
            .add_audio(&mut corpus, None, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.audio_reused, 1);
        assert_eq!(report.audio_synthesized, 0);
        assert_eq!(
            corpus.entries()[0].language("es").unwrap().audio.as_deref(),
            Some("thank you_es_gracias.mp3")
        );
        assert_eq!(
            std::fs::read(audio_dir.join("thank you_es_gracias.mp3")).unwrap(),
            b"ID3 shipped"
        );
    }

    #[tokio::test]
    async fn test_add_audio_keeps_uppercase_language_key() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path()))
            .with_synthesizer(Box::new(FakeSynthesizer::default()));
        let mut corpus: Corpus = serde_json::from_str(
            r#"[{"original": "water", "ES": {"word": "agua", "text": "agua"}}]"#,
        )
        .unwrap();

        let report = pipeline
            .add_audio(&mut corpus, None, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(report.audio_synthesized, 1);
        assert_eq!(report.failures, 0);
        let entry = &corpus.entries()[0];
        assert_eq!(entry.language_codes().collect::<Vec<_>>(), vec!["ES"]);
        assert_eq!(
            entry.language("ES").unwrap().audio.as_deref(),
            Some("water_ES_agua.mp3")
        );
        assert!(dir.path().join("audio_files/water_ES_agua.mp3").exists());
    }

    #[tokio::test]
    async fn test_add_audio_limited_to_languages() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_synthesizer(Box::new(FakeSynthesizer {
            calls: calls.clone(),
            ..Default::default()
        }));

        let mut corpus = translated_corpus();
        let only = langs(&["ja"]);
        pipeline
            .add_audio(&mut corpus, Some(&only), &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(corpus.entries()[0].language("es").unwrap().audio.is_none());
        assert!(corpus.entries()[0].language("ja").unwrap().audio.is_some());
    }

    #[tokio::test]
    async fn test_add_audio_failure_clears_dangling_reference() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(settings(dir.path())).with_synthesizer(Box::new(FakeSynthesizer {
            broken: vec!["es"],
            ..Default::default()
        }));

        let mut corpus = translated_corpus();
        if let Some(result) = corpus.entry_mut(0).and_then(|e| e.language_mut("es")) {
            result.audio = Some("old_name.mp3".to_string());
        }

        let report = pipeline
            .add_audio(&mut corpus, None, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.audio_synthesized, 1);
        assert!(corpus.entries()[0].language("es").unwrap().audio.is_none());
    }

    #[tokio::test]
    async fn test_add_audio_skips_results_without_word() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(settings(dir.path())).with_synthesizer(Box::new(FakeSynthesizer {
            calls: calls.clone(),
            ..Default::default()
        }));

        let mut corpus: Corpus = serde_json::from_str(
            r#"[{"original": "help", "es": {"IPA": "x"}, "xx": {"word": "?"}}]"#,
        )
        .unwrap();
        let report = pipeline
            .add_audio(&mut corpus, None, &mut checkpointer(dir.path(), 10))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped, 2);
    }

    // ==================== Carry-over Tests ====================

    #[test]
    fn test_carry_over_does_not_replace_fresh_fields() {
        let mut previous = LanguageResult::translated("hola");
        previous.ipa = Some("old".to_string());
        previous.respelling = Some("OH-lah".to_string());

        let mut fresh = LanguageResult::translated("hola");
        fresh.ipa = Some("ˈola".to_string());
        carry_over(previous, &mut fresh);

        assert_eq!(fresh.ipa.as_deref(), Some("ˈola"));
        assert_eq!(fresh.respelling.as_deref(), Some("OH-lah"));
    }
}
