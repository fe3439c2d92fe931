//! Counters for one pipeline pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-pass counters. Shared by reference across the fan-out of one entry.
#[derive(Debug)]
pub struct RunStats {
    started_at: DateTime<Utc>,
    translated: AtomicUsize,
    skipped: AtomicUsize,
    annotated: AtomicUsize,
    annotation_misses: AtomicUsize,
    audio_synthesized: AtomicUsize,
    audio_reused: AtomicUsize,
    failures: AtomicUsize,
    checkpoints: AtomicUsize,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            translated: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            annotated: AtomicUsize::new(0),
            annotation_misses: AtomicUsize::new(0),
            audio_synthesized: AtomicUsize::new(0),
            audio_reused: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            checkpoints: AtomicUsize::new(0),
        }
    }

    /// A language result was (re)translated.
    pub fn record_translated(&self) {
        self.translated.fetch_add(1, Ordering::Relaxed);
    }

    /// Work already present in the corpus; nothing to do.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_annotated(&self) {
        self.annotated.fetch_add(1, Ordering::Relaxed);
    }

    /// The annotator returned nothing or failed; the entry was kept without it.
    pub fn record_annotation_miss(&self) {
        self.annotation_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_synthesized(&self) {
        self.audio_synthesized.fetch_add(1, Ordering::Relaxed);
    }

    /// Audio file already on disk.
    pub fn record_audio_reused(&self) {
        self.audio_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub fn translated(&self) -> usize {
        self.translated.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn annotated(&self) -> usize {
        self.annotated.load(Ordering::Relaxed)
    }

    pub fn annotation_misses(&self) -> usize {
        self.annotation_misses.load(Ordering::Relaxed)
    }

    pub fn audio_synthesized(&self) -> usize {
        self.audio_synthesized.load(Ordering::Relaxed)
    }

    pub fn audio_reused(&self) -> usize {
        self.audio_reused.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn checkpoints(&self) -> usize {
        self.checkpoints.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> StatsReport {
        let finished_at = Utc::now();
        let succeeded = self.translated() + self.audio_synthesized() + self.annotated();
        let attempted = succeeded + self.failures();
        let success_rate = if attempted > 0 {
            (succeeded as f64 / attempted as f64) * 100.0
        } else {
            100.0
        };

        StatsReport {
            started_at: self.started_at,
            finished_at,
            elapsed_secs: (finished_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            translated: self.translated(),
            skipped: self.skipped(),
            annotated: self.annotated(),
            annotation_misses: self.annotation_misses(),
            audio_synthesized: self.audio_synthesized(),
            audio_reused: self.audio_reused(),
            failures: self.failures(),
            checkpoints: self.checkpoints(),
            success_rate,
        }
    }
}

/// Snapshot of `RunStats`, written with `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub translated: usize,
    pub skipped: usize,
    pub annotated: usize,
    pub annotation_misses: usize,
    pub audio_synthesized: usize,
    pub audio_reused: usize,
    pub failures: usize,
    pub checkpoints: usize,
    /// Percentage of attempted provider work that succeeded
    pub success_rate: f64,
}

impl StatsReport {
    pub fn has_failures(&self) -> bool {
        self.failures > 0
    }

    /// One line for the end-of-run log.
    pub fn summary(&self) -> String {
        format!(
            "{} translated, {} annotated ({} without annotation), {} audio files synthesized, \
             {} reused, {} skipped, {} failed, {} checkpoints in {:.1}s",
            self.translated,
            self.annotated,
            self.annotation_misses,
            self.audio_synthesized,
            self.audio_reused,
            self.skipped,
            self.failures,
            self.checkpoints,
            self.elapsed_secs
        )
    }
}
