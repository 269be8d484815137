//! Asynchronous job queue with per-job status records.
//!
//! Work is dispatched in-process through bounded worker pools; job status
//! lives in the coordination store under `{task}:::{request_id}` with a TTL,
//! so clients polling by request id observe terminal state for a while after
//! the job leaves the queue. The queue never retries; re-scheduling is the
//! caller's responsibility.

use crate::error::{CoordError, CoordResult};
use crate::store::CoordStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc};
use uuid::Uuid;

/// Outcome of a job handler: a JSON result or an error message.
pub type JobResult = Result<serde_json::Value, String>;

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub task: String,
    pub params: serde_json::Value,
}

/// Status record for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum JobStatus {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "DONE")]
    Done { resp: serde_json::Value },
    #[serde(rename = "FAILED")]
    Failed { error: String },
}

/// Coordination key for a job's status record.
pub fn status_key(task: &str, request_id: &str) -> String {
    format!("{task}:::{request_id}")
}

/// The shared work queue.
pub struct JobQueue {
    store: Arc<dyn CoordStore>,
    status_ttl: Duration,
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn CoordStore>, status_ttl: Duration) -> Self {
        Self {
            store,
            status_ttl,
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue a job for a task type. Returns the job id, which doubles as
    /// the request id for status polling.
    ///
    /// Fails with [`CoordError::UnknownTask`] when no processor has been
    /// registered for the task.
    pub async fn enqueue(&self, task: &str, params: serde_json::Value) -> CoordResult<Uuid> {
        let sender = {
            let senders = self.senders.lock().await;
            senders
                .get(task)
                .cloned()
                .ok_or_else(|| CoordError::UnknownTask(task.to_string()))?
        };

        let job = Job {
            job_id: Uuid::new_v4(),
            task: task.to_string(),
            params,
        };

        self.write_status(task, &job.job_id.to_string(), &JobStatus::InProgress)
            .await?;

        if sender.send(job.clone()).is_err() {
            let status = JobStatus::Failed {
                error: "task processor stopped".to_string(),
            };
            self.write_status(task, &job.job_id.to_string(), &status)
                .await?;
            return Err(CoordError::Internal(format!(
                "processor for task {task} is gone"
            )));
        }

        Ok(job.job_id)
    }

    /// Read a job's status record. `None` once the TTL has elapsed (or for
    /// a request id that never existed).
    pub async fn status(&self, task: &str, request_id: &str) -> CoordResult<Option<JobStatus>> {
        let raw = self.store.get(&status_key(task, request_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Register the handler for a task type and start its worker pool.
    ///
    /// Up to `concurrency` handlers run at once. Handler errors and panics
    /// are recorded as `FAILED` status and never crash a worker. Registering
    /// a task type again replaces the previous handler; jobs already handed
    /// to the old pool still complete there.
    pub async fn process<F, Fut>(&self, task: &str, concurrency: usize, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        self.senders.lock().await.insert(task.to_string(), tx);

        let store = self.store.clone();
        let status_ttl = self.status_ttl;
        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let task_name = task.to_string();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let handler = handler.clone();
                let store = store.clone();
                let task_name = task_name.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let request_id = job.job_id.to_string();
                    let job_id = job.job_id;

                    // The handler runs in its own task so a panic is
                    // contained and observable as a JoinError.
                    let inner = tokio::spawn(async move { handler(job).await });
                    let status = match inner.await {
                        Ok(Ok(resp)) => JobStatus::Done { resp },
                        Ok(Err(error)) => JobStatus::Failed { error },
                        Err(join_err) if join_err.is_panic() => JobStatus::Failed {
                            error: "job handler panicked".to_string(),
                        },
                        Err(join_err) => JobStatus::Failed {
                            error: format!("job handler aborted: {join_err}"),
                        },
                    };

                    if let JobStatus::Failed { error } = &status {
                        tracing::warn!(task = %task_name, job_id = %job_id, error = %error, "job failed");
                    } else {
                        tracing::debug!(task = %task_name, job_id = %job_id, "job done");
                    }

                    let key = status_key(&task_name, &request_id);
                    let serialized = match serde_json::to_string(&status) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::error!(task = %task_name, job_id = %job_id, error = %e, "failed to serialize job status");
                            return;
                        }
                    };
                    if let Err(e) = store.set(&key, &serialized, Some(status_ttl)).await {
                        tracing::error!(task = %task_name, job_id = %job_id, error = %e, "failed to record job status");
                    }
                });
            }
        });
    }

    async fn write_status(
        &self,
        task: &str,
        request_id: &str,
        status: &JobStatus,
    ) -> CoordResult<()> {
        let serialized = serde_json::to_string(status)?;
        self.store
            .set(
                &status_key(task, request_id),
                &serialized,
                Some(self.status_ttl),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCoordStore;
    use serde_json::json;

    fn queue_with_ttl(ttl: Duration) -> JobQueue {
        let store: Arc<dyn CoordStore> = Arc::new(MemoryCoordStore::new());
        JobQueue::new(store, ttl)
    }

    async fn wait_terminal(queue: &JobQueue, task: &str, request_id: &str) -> JobStatus {
        for _ in 0..100 {
            if let Some(status) = queue.status(task, request_id).await.unwrap()
                && status != JobStatus::InProgress
            {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not reach a terminal status");
    }

    #[tokio::test]
    async fn job_completes_with_done_status() {
        let queue = queue_with_ttl(Duration::from_secs(60));
        queue
            .process("echo", 2, |job: Job| async move { Ok(job.params) })
            .await;

        let job_id = queue.enqueue("echo", json!({"x": 1})).await.unwrap();
        let status = wait_terminal(&queue, "echo", &job_id.to_string()).await;
        assert_eq!(
            status,
            JobStatus::Done {
                resp: json!({"x": 1})
            }
        );
    }

    #[tokio::test]
    async fn handler_error_is_recorded_as_failed() {
        let queue = queue_with_ttl(Duration::from_secs(60));
        queue
            .process("bad", 1, |_job: Job| async move {
                Err("boom".to_string())
            })
            .await;

        let job_id = queue.enqueue("bad", json!({})).await.unwrap();
        let status = wait_terminal(&queue, "bad", &job_id.to_string()).await;
        assert_eq!(
            status,
            JobStatus::Failed {
                error: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let queue = queue_with_ttl(Duration::from_secs(60));
        queue
            .process("explode", 1, |_job: Job| async move {
                panic!("kaboom");
                #[allow(unreachable_code)]
                Ok(serde_json::Value::Null)
            })
            .await;

        let job_id = queue.enqueue("explode", json!({})).await.unwrap();
        let status = wait_terminal(&queue, "explode", &job_id.to_string()).await;
        assert!(matches!(status, JobStatus::Failed { .. }));

        // The worker pool survives the panic.
        let job_id = queue.enqueue("explode", json!({})).await.unwrap();
        wait_terminal(&queue, "explode", &job_id.to_string()).await;
    }

    #[tokio::test]
    async fn enqueue_unknown_task_errors() {
        let queue = queue_with_ttl(Duration::from_secs(60));
        let err = queue.enqueue("nobody", json!({})).await.unwrap_err();
        assert!(matches!(err, CoordError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn status_expires_after_ttl() {
        let queue = queue_with_ttl(Duration::from_millis(50));
        queue
            .process("quick", 1, |_job: Job| async move {
                Ok(serde_json::Value::Null)
            })
            .await;

        let job_id = queue.enqueue("quick", json!({})).await.unwrap();
        wait_terminal(&queue, "quick", &job_id.to_string()).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            queue
                .status("quick", &job_id.to_string())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn reregistration_replaces_handler() {
        let queue = queue_with_ttl(Duration::from_secs(60));
        queue
            .process("t", 1, |_job: Job| async move { Ok(json!("first")) })
            .await;
        queue
            .process("t", 1, |_job: Job| async move { Ok(json!("second")) })
            .await;

        let job_id = queue.enqueue("t", json!({})).await.unwrap();
        let status = wait_terminal(&queue, "t", &job_id.to_string()).await;
        assert_eq!(status, JobStatus::Done { resp: json!("second") });
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let queue = queue_with_ttl(Duration::from_secs(60));
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let (active_c, peak_c) = (active.clone(), peak.clone());
        queue
            .process("slow", 2, move |_job: Job| {
                let active = active_c.clone();
                let peak = peak_c.clone();
                async move {
                    use std::sync::atomic::Ordering;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(serde_json::Value::Null)
                }
            })
            .await;

        let mut ids = vec![];
        for _ in 0..6 {
            ids.push(queue.enqueue("slow", json!({})).await.unwrap());
        }
        for id in ids {
            wait_terminal(&queue, "slow", &id.to_string()).await;
        }
        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }
}
