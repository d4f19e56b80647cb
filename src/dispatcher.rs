//! Concurrent fan-out of remediations.
//!
//! Every device runs in its own tokio task. A semaphore caps how many of them hold a
//! session at the same time, and a panic in one task becomes a `Failed(Other)` outcome
//! for that device only.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::FailureKind;
use crate::inventory::DeviceTarget;
use crate::remediator::{RemediationOutcome, Remediator};
use crate::session::Connector;

/// Runs remediations with a bounded number of devices in flight.
pub struct Dispatcher<C: Connector> {
    remediator: Arc<Remediator<C>>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl<C: Connector> Dispatcher<C> {
    /// A concurrency of zero is treated as one.
    pub fn new(remediator: Remediator<C>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            remediator: Arc::new(remediator),
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Remediates a single device in its own task.
    pub async fn remediate_one(&self, target: DeviceTarget) -> RemediationOutcome {
        let remediator = self.remediator.clone();
        let task_target = target.clone();
        match tokio::spawn(async move { remediator.remediate(task_target).await }).await {
            Ok(outcome) => outcome,
            Err(err) => self.task_failed(target, &err),
        }
    }

    /// Remediates every target and returns once all of them have finished.
    ///
    /// `on_complete` sees each outcome as soon as its device is done, so outcomes arrive
    /// in completion order. The returned vector has the same order.
    pub async fn remediate_all<F>(
        &self,
        targets: Vec<DeviceTarget>,
        mut on_complete: F,
    ) -> Vec<RemediationOutcome>
    where
        F: FnMut(&RemediationOutcome),
    {
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(targets.len());

        for target in targets {
            let remediator = self.remediator.clone();
            let permits = self.permits.clone();
            let task_target = target.clone();
            let handle = tasks.spawn(async move {
                // The semaphore is never closed, so acquiring only fails on shutdown.
                let _permit = permits.acquire_owned().await.ok();
                remediator.remediate(task_target).await
            });
            pending.insert(handle.id(), target);
        }
        debug!(
            "dispatched {} devices, at most {} at a time",
            pending.len(),
            self.concurrency
        );

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcome
                }
                Err(err) => match pending.remove(&err.id()) {
                    Some(target) => self.task_failed(target, &err),
                    None => {
                        error!("remediation task {} ended without a known device: {}", err.id(), err);
                        continue;
                    }
                },
            };
            on_complete(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    fn task_failed(&self, target: DeviceTarget, err: &JoinError) -> RemediationOutcome {
        error!("remediation task for {} aborted: {}", target, err);
        self.remediator.record_failure(target, FailureKind::Other)
    }
}
