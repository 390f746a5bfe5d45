//! Job queue (C7): an async FIFO shared by the worker pool. Two instances
//! are created per run -- `main` and, when less-locking applies, a second
//! queue dedicated to the non-transactional-table list jobs.

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

use crate::plan::Job;

pub struct JobQueue {
    inner: Mutex<VecDeque<Job>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        JobQueue {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job: Job) {
        self.inner.lock().await.push_back(job);
        self.notify.notify_one();
    }

    pub async fn push_many(&self, jobs: impl IntoIterator<Item = Job>) {
        let mut guard = self.inner.lock().await;
        for job in jobs {
            guard.push_back(job);
        }
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Pops the next job, suspending until one is available. There is no
    /// "closed" state: callers learn to stop by popping a `Job::Shutdown`
    /// sentinel, one of which is pushed per worker at the end of planning.
    pub async fn pop(&self) -> Job {
        loop {
            if let Some(job) = self.inner.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pop_returns_jobs_in_fifo_order() {
        let q = JobQueue::new();
        q.push(Job::DumpSchema("a".into())).await;
        q.push(Job::DumpSchema("b".into())).await;
        match q.pop().await {
            Job::DumpSchema(name) => assert_eq!(name, "a"),
            _ => panic!("unexpected job"),
        }
        match q.pop().await {
            Job::DumpSchema(name) => assert_eq!(name, "b"),
            _ => panic!("unexpected job"),
        }
    }

    #[tokio::test]
    async fn pop_suspends_until_a_push_arrives() {
        let q = std::sync::Arc::new(JobQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::task::yield_now().await;
        q.push(Job::Shutdown).await;
        let job = handle.await.unwrap();
        assert!(matches!(job, Job::Shutdown));
    }
}
