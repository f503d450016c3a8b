use serde::Serialize;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Structural,
    ClipValidation,
    Integrity,
    Migration,
    AssetMissing,
    /// The robust path failed and a fallback produced the timeline.
    Recovery,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::Structural => "structural",
            IssueKind::ClipValidation => "clip",
            IssueKind::Integrity => "integrity",
            IssueKind::Migration => "migration",
            IssueKind::AssetMissing => "asset",
            IssueKind::Recovery => "recovery",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
}

/// Where the returned timeline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// Built from the stored document.
    #[default]
    Stored,
    /// Nothing stored under the key.
    NewProject,
    /// Stored document unusable, fresh default timeline.
    Default,
    /// Built by the simple decode path after the robust path failed.
    Fallback,
}

/// Diagnostics for one load. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadingReport {
    pub source: LoadSource,
    pub schema_version: Option<String>,
    pub migrated_from: Option<String>,
    pub total_clips: usize,
    pub loaded_clips: usize,
    pub failed_clips: usize,
    pub missing_assets: usize,
    pub issues: Vec<Issue>,
    pub elapsed_ms: f64,
    pub clips_per_second: f64,
}

impl LoadingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(Issue {
            kind,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, kind: IssueKind, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.push(kind, message);
        }
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|i| i.message.as_str())
    }

    /// Percentage of clip records that made it into the timeline.
    pub fn success_rate(&self) -> f64 {
        self.loaded_clips as f64 / self.total_clips.max(1) as f64 * 100.0
    }

    pub(crate) fn finish(&mut self, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        self.elapsed_ms = elapsed * 1000.0;
        self.clips_per_second = self.loaded_clips as f64 / elapsed.max(0.001);
    }
}
