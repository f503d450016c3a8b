use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use project::{load_timeline, LoadError, LoadOptions, LoadOutcome, LoaderContext};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{key}: {source}")]
    Load {
        key: String,
        #[source]
        source: LoadError,
    },
    #[error("{0}: batch cancelled before load started")]
    Canceled(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobStatus {
    Running,
    Done { clips: usize },
    Failed(String),
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub key: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_requested: usize,
    pub successfully_loaded: usize,
    pub failed_to_load: usize,
    pub total_clips: usize,
    pub total_load_time_ms: f64,
    pub errors: Vec<String>,
}

impl BatchSummary {
    pub fn success_rate(&self) -> f64 {
        self.successfully_loaded as f64 / self.total_requested.max(1) as f64 * 100.0
    }
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub results: BTreeMap<String, Result<LoadOutcome, JobError>>,
    pub summary: BatchSummary,
}

impl BatchResult {
    pub fn loaded(&self) -> impl Iterator<Item = (&str, &LoadOutcome)> {
        self.results
            .iter()
            .filter_map(|(key, r)| r.as_ref().ok().map(|o| (key.as_str(), o)))
    }
}

/// Loads many asset keys on a bounded pool of scoped worker threads.
pub struct BatchLoader {
    ctx: LoaderContext,
    options: LoadOptions,
    workers: usize,
}

impl BatchLoader {
    pub fn new(ctx: LoaderContext, options: LoadOptions, workers: usize) -> Self {
        Self {
            ctx,
            options,
            workers,
        }
    }

    pub fn load_all(&self, keys: &[String]) -> BatchResult {
        self.load_all_with(keys, |_| {})
    }

    /// Like [`load_all`](Self::load_all), reporting each key's progress to
    /// `on_event` from the worker that handles it.
    pub fn load_all_with<F>(&self, keys: &[String], on_event: F) -> BatchResult
    where
        F: Fn(&JobEvent) + Sync,
    {
        let started = Instant::now();
        let unique: BTreeSet<&String> = keys.iter().collect();
        let workers = self.workers.clamp(1, unique.len().max(1));
        info!(keys = unique.len(), workers, "starting batch load");

        let (tx_key, rx_key) = unbounded::<String>();
        for key in &unique {
            let _ = tx_key.send((*key).clone());
        }
        drop(tx_key);

        let results = Mutex::new(BTreeMap::new());
        let cancel = self.ctx.cancel_flag();
        thread::scope(|scope| {
            for worker in 0..workers {
                let rx = rx_key.clone();
                let results = &results;
                let on_event = &on_event;
                scope.spawn(move || {
                    for key in rx.iter() {
                        if cancel.is_cancelled() {
                            on_event(&JobEvent {
                                key: key.clone(),
                                status: JobStatus::Canceled,
                            });
                            results
                                .lock()
                                .insert(key.clone(), Err(JobError::Canceled(key)));
                            continue;
                        }
                        on_event(&JobEvent {
                            key: key.clone(),
                            status: JobStatus::Running,
                        });
                        debug!(worker, key = %key, "loading");
                        let result = load_timeline(&self.ctx, &key, self.options);
                        let status = match &result {
                            Ok(outcome) => JobStatus::Done {
                                clips: outcome.timeline.clip_count(),
                            },
                            Err(LoadError::Cancelled) => JobStatus::Canceled,
                            Err(e) => JobStatus::Failed(e.to_string()),
                        };
                        on_event(&JobEvent {
                            key: key.clone(),
                            status,
                        });
                        let result = result.map_err(|source| JobError::Load {
                            key: key.clone(),
                            source,
                        });
                        results.lock().insert(key, result);
                    }
                });
            }
        });

        let results = results.into_inner();
        let mut summary = BatchSummary {
            total_requested: unique.len(),
            ..BatchSummary::default()
        };
        for result in results.values() {
            match result {
                Ok(outcome) => {
                    summary.successfully_loaded += 1;
                    summary.total_clips += outcome.timeline.clip_count();
                }
                Err(e) => {
                    summary.failed_to_load += 1;
                    summary.errors.push(e.to_string());
                }
            }
        }
        summary.total_load_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if summary.failed_to_load > 0 {
            warn!(failed = summary.failed_to_load, "some timelines failed to load");
        }
        info!(
            loaded = summary.successfully_loaded,
            requested = summary.total_requested,
            clips = summary.total_clips,
            elapsed_ms = %format!("{:.1}", summary.total_load_time_ms),
            "batch load finished"
        );

        BatchResult { results, summary }
    }
}
