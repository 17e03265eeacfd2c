//! Cancelable dataset loading with last-requested-wins semantics.
//!
//! Every call to [`DatasetLoader::load`] takes a new generation number and
//! aborts the fetch still in flight, if any. A load whose generation is no
//! longer current when its fetch resolves reports [`LoadOutcome::Superseded`]
//! and its data is dropped.

use crate::error::{Result, TrendError};
use crate::ingestion::normalize_records;
use crate::schema::{DashboardConfig, Dataset, RawTable};
use futures::future::{AbortHandle, Abortable};
use log::{debug, warn};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub enum LoadOutcome {
    Ready { generation: u64, dataset: Dataset },
    Superseded { generation: u64 },
    Failed { generation: u64, error: TrendError },
}

impl LoadOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            LoadOutcome::Ready { generation, .. }
            | LoadOutcome::Superseded { generation }
            | LoadOutcome::Failed { generation, .. } => *generation,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, LoadOutcome::Superseded { .. })
    }
}

pub struct DatasetLoader {
    config: DashboardConfig,
    generation: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl DatasetLoader {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Abandons whatever load is in flight without starting a new one.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.replace_in_flight(None) {
            previous.abort();
        }
    }

    /// Starts loading `name` from `fetch`.
    ///
    /// The request is registered (and any earlier one aborted) as soon as this
    /// is called, before the returned future is first polled.
    pub fn load<'a, Fut>(&'a self, name: String, fetch: Fut) -> impl Future<Output = LoadOutcome> + 'a
    where
        Fut: Future<Output = Result<RawTable>> + 'a,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = self.replace_in_flight(Some(handle)) {
            previous.abort();
        }
        debug!("Loading dataset '{}' (request {})", name, generation);

        async move {
            let fetched = Abortable::new(fetch, registration).await;

            if generation != self.current_generation() {
                debug!(
                    "Dropping result for '{}' (request {}): superseded",
                    name, generation
                );
                return LoadOutcome::Superseded { generation };
            }

            let table = match fetched {
                Err(_aborted) => return LoadOutcome::Superseded { generation },
                Ok(Err(error)) => {
                    let error = match error {
                        TrendError::LoadFailed(_) => error,
                        other => TrendError::LoadFailed(other.to_string()),
                    };
                    warn!("Loading dataset '{}' failed: {}", name, error);
                    return LoadOutcome::Failed { generation, error };
                }
                Ok(Ok(table)) => table,
            };

            match normalize_records(&name, &table, &self.config) {
                Ok(dataset) => LoadOutcome::Ready {
                    generation,
                    dataset,
                },
                Err(error) => {
                    warn!("Dataset '{}' could not be normalized: {}", name, error);
                    LoadOutcome::Failed { generation, error }
                }
            }
        }
    }

    fn replace_in_flight(&self, handle: Option<AbortHandle>) -> Option<AbortHandle> {
        let mut guard = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, handle)
    }
}
