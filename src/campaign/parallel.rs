//! Parallel campaign execution
//!
//! Workers run on the blocking pool, each inside its own `worker-<i>`
//! workspace, and pull samples from a shared source. Results flow back over
//! a bounded channel to the one accumulator, which stays the only place that
//! counts, checkpoints, and decides to stop. Row order is completion order.

use super::{Campaign, CampaignAccumulator, CampaignSummary, SampleOutcome, StopReason};
use crate::sample::ParameterSet;
use crate::workspace::ArtifactWorkspace;
use crate::{Error, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Message = (usize, Result<SampleOutcome>);

impl Campaign {
    /// Run the campaign over `config.workers` concurrent workers.
    ///
    /// Once the usable target is reached no new samples are started; results
    /// already in flight are received and dropped.
    ///
    /// # Errors
    ///
    /// Returns the first campaign-level failure reported by any worker, a
    /// [`Error::Worker`] if a worker panicked, or an error writing the final
    /// artifacts. The partial dataset is written before an error is returned.
    pub async fn run_parallel<I>(&self, samples: I) -> Result<CampaignSummary>
    where
        I: IntoIterator<Item = ParameterSet>,
        I::IntoIter: Send + 'static,
    {
        let started_at = Utc::now();
        let workers = self.config.workers.max(1);
        let root = ArtifactWorkspace::create(&self.config.paths.workspace)?;
        let mut acc = CampaignAccumulator::from_config(&self.config);

        let source = Arc::new(Mutex::new(samples.into_iter().enumerate()));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<Message>(workers);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let workspace = root.worker(worker)?;
            let campaign = self.clone();
            let source = Arc::clone(&source);
            let stop = Arc::clone(&stop);
            let tx = tx.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                campaign.worker_loop(worker, &workspace, &*source, &*stop, &tx);
            }));
        }
        drop(tx);
        info!(workers, "parallel campaign started");

        let mut reason = StopReason::SourceExhausted;
        let mut failure: Option<Error> = None;
        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(outcome) => {
                    let was_closed = acc.is_closed();
                    if !acc.offer(outcome.into_offer(index)) && !was_closed {
                        reason = StopReason::TargetReached;
                        stop.store(true, Ordering::Release);
                    }
                }
                Err(e) => {
                    stop.store(true, Ordering::Release);
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                if failure.is_none() {
                    failure = Some(Error::Worker(e.to_string()));
                }
            }
        }

        if let Some(e) = failure {
            return Err(self.abort(&acc, e));
        }

        acc.finalize(&self.config.paths, &self.consulted)?;
        let summary = acc.summary(reason, started_at);
        info!(
            ?summary.stop,
            processed = summary.processed,
            usable = summary.usable,
            dropped = summary.dropped,
            "parallel campaign finished"
        );
        Ok(summary)
    }

    fn worker_loop<S>(
        &self,
        worker: usize,
        workspace: &ArtifactWorkspace,
        source: &Mutex<S>,
        stop: &AtomicBool,
        tx: &mpsc::Sender<Message>,
    ) where
        S: Iterator<Item = (usize, ParameterSet)>,
    {
        loop {
            if stop.load(Ordering::Acquire) {
                debug!(worker, "stop requested");
                break;
            }
            let next = match source.lock() {
                Ok(mut samples) => samples.next(),
                Err(_) => {
                    warn!(worker, "sample source poisoned");
                    break;
                }
            };
            let Some((index, params)) = next else {
                break;
            };

            let result = self.process_sample(index, &params, workspace);
            let fatal = result.is_err();
            if tx.blocking_send((index, result)).is_err() || fatal {
                break;
            }
        }
        debug!(worker, "worker finished");
    }
}
