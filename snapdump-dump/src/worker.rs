//! Worker pool (C7): one async task per configured thread, each consuming
//! jobs from the main queue (and, in less-locking mode, a dedicated
//! non-transactional-table list job) until it pops `Job::Shutdown`.

use slog_scope::{error, info};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use crate::diskspace::PauseGate;
use crate::error::JobError;
use crate::plan::Job;
use crate::queue::JobQueue;
use crate::signal::ShutdownFlag;

/// Greedy longest-processing-time-first bin packing: always add the next
/// table to whichever worker currently has the smallest running sum. Used
/// to split non-transactional tables across less-locking workers so no
/// single worker holds its per-table locks for much longer than the
/// others.
pub fn bin_pack_by_length<T>(mut items: Vec<(T, u64)>, worker_count: usize) -> Vec<Vec<T>> {
    items.sort_by(|a, b| b.1.cmp(&a.1));
    let mut buckets: Vec<Vec<T>> = (0..worker_count).map(|_| Vec::new()).collect();
    let mut sums = vec![0u64; worker_count];
    for (item, length) in items {
        let (idx, _) = sums
            .iter()
            .enumerate()
            .min_by_key(|(_, sum)| **sum)
            .expect("worker_count > 0");
        sums[idx] += length;
        buckets[idx].push(item);
    }
    buckets
}

/// Counters gating the early release of FTWRL in less-locking mode: the
/// gate fires once every non-transactional table has been dumped.
pub struct NonInnodbGate {
    remaining: AtomicU32,
    notify: tokio::sync::Notify,
}

impl NonInnodbGate {
    pub fn new(total: u32) -> Arc<Self> {
        Arc::new(NonInnodbGate {
            remaining: AtomicU32::new(total),
            notify: tokio::sync::Notify::new(),
        })
    }

    pub fn complete_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait_until_done(&self) {
        while self.remaining.load(Ordering::SeqCst) > 0 {
            self.notify.notified().await;
        }
    }
}

/// What a worker needs to execute jobs. Left intentionally thin: the
/// actual SQL row serialization and compression codec are external
/// collaborators the worker calls into, not reimplemented here.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<(), JobError>;
}

/// One async task per worker. In less-locking mode, a worker first claims
/// its bin-packed non-transactional bucket from `less_locking_queue` --
/// exactly one bucket per worker, so a single pop suffices -- before
/// joining the main queue for schema/view/transactional-table jobs.
#[allow(clippy::too_many_arguments)]
pub async fn run_worker(
    index: usize,
    queue: Arc<JobQueue>,
    less_locking_queue: Option<Arc<JobQueue>>,
    executor: Arc<dyn JobExecutor>,
    ready: Arc<Barrier>,
    pause_gate: Arc<PauseGate>,
    non_innodb_gate: Arc<NonInnodbGate>,
    shutdown: ShutdownFlag,
    errors: Arc<AtomicU32>,
) {
    ready.wait().await;

    if let Some(ll_queue) = &less_locking_queue {
        let bucket = ll_queue.pop().await;
        pause_gate.wait_if_paused().await;
        let bucket_len = match &bucket {
            Job::DumpNonTransactionalBucket { tables } => tables.len(),
            _ => 0,
        };
        if let Err(e) = executor.execute(&bucket).await {
            error!("less-locking bucket failed"; "worker" => index, "error" => %e);
            errors.fetch_add(1, Ordering::SeqCst);
        }
        for _ in 0..bucket_len {
            non_innodb_gate.complete_one();
        }
    }

    loop {
        if shutdown.is_set() {
            info!("worker stopping on shutdown signal before next job"; "worker" => index);
            return;
        }
        let job = queue.pop().await;
        if matches!(job, Job::Shutdown) {
            info!("worker shutting down"; "worker" => index);
            return;
        }
        if shutdown.is_set() {
            info!("worker stopping on shutdown signal, dropping popped job"; "worker" => index);
            return;
        }
        pause_gate.wait_if_paused().await;
        let is_non_transactional = matches!(
            &job,
            Job::DumpTableData { is_non_transactional: true, .. }
        );
        if let Err(e) = executor.execute(&job).await {
            error!("job failed"; "worker" => index, "error" => %e);
            errors.fetch_add(1, Ordering::SeqCst);
        }
        if is_non_transactional {
            non_innodb_gate.complete_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_pack_balances_by_running_sum() {
        let items = vec![("t1", 40u64), ("t2", 30), ("t3", 20), ("t4", 10)];
        let buckets = bin_pack_by_length(items, 4);
        assert_eq!(buckets.iter().map(|b| b.len()).sum::<usize>(), 4);
        // Largest item goes to an empty bucket first; each subsequent
        // item goes to the currently-lightest bucket.
        assert!(buckets.iter().any(|b| b.contains(&"t1")));
    }

    #[tokio::test]
    async fn non_innodb_gate_releases_after_all_complete() {
        let gate = NonInnodbGate::new(2);
        gate.complete_one();
        let gate2 = gate.clone();
        let handle = tokio::spawn(async move { gate2.wait_until_done().await });
        tokio::task::yield_now().await;
        gate.complete_one();
        handle.await.unwrap();
    }
}
