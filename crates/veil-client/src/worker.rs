//! Background execution context for blocking identity/crypto work.
//!
//! One dedicated OS thread drains a FIFO job queue, so identity SDK calls
//! never overlap and complete in submission order. Jobs report back by
//! posting into whatever channel they captured.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{Result, SessionError};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct BackgroundWorker {
    jobs: mpsc::UnboundedSender<Job>,
}

impl BackgroundWorker {
    pub fn spawn() -> Result<Self> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        thread::Builder::new()
            .name("veil-worker".into())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("Background job panicked");
                    }
                }
                debug!("Background worker stopped");
            })
            .map_err(|e| {
                error!(error = %e, "Failed to start background worker");
                SessionError::WorkerUnavailable
            })?;

        Ok(Self { jobs })
    }

    /// Queue `job` behind everything submitted before it.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.jobs
            .send(Box::new(job))
            .map_err(|_| SessionError::WorkerUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn test_jobs_run_in_order() {
        let worker = BackgroundWorker::spawn().unwrap();
        let (tx, rx) = std_mpsc::channel();
        for i in 0..16 {
            let tx = tx.clone();
            worker.submit(move || tx.send(i).unwrap()).unwrap();
        }
        let seen: Vec<i32> = (0..16).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_does_not_stop_worker() {
        let worker = BackgroundWorker::spawn().unwrap();
        worker.submit(|| panic!("boom")).unwrap();

        let (tx, rx) = std_mpsc::channel();
        worker.submit(move || tx.send("still alive").unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), "still alive");
    }
}
