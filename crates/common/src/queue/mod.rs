//! In-process job queue for background OPORD analysis
//!
//! The write path enqueues a job keyed by document id and returns
//! immediately; a worker task inside the gateway process drains the
//! channel. Successive jobs for the same document race as last-write-wins
//! on the annotation field.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Analysis job message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub opord_id: Uuid,
}

/// Sender half handed to request handlers
#[derive(Clone)]
pub struct AnalysisQueue {
    tx: mpsc::UnboundedSender<AnalysisJob>,
}

/// Receiver half consumed by the worker loop
pub type AnalysisReceiver = mpsc::UnboundedReceiver<AnalysisJob>;

impl AnalysisQueue {
    /// Enqueue a job, fire-and-forget. A closed channel means the worker
    /// is gone; the job is dropped with an error log rather than failing
    /// the request that triggered it.
    pub fn enqueue(&self, job: AnalysisJob) {
        tracing::debug!(opord_id = %job.opord_id, "Enqueueing analysis job");
        if self.tx.send(job).is_err() {
            tracing::error!("Analysis worker is not running, dropping job");
        }
    }
}

/// Create a connected queue/receiver pair
pub fn analysis_channel() -> (AnalysisQueue, AnalysisReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AnalysisQueue { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_delivers_to_receiver() {
        let (queue, mut rx) = analysis_channel();
        let opord_id = Uuid::new_v4();

        queue.enqueue(AnalysisJob { opord_id });

        let job = rx.recv().await.expect("job should be delivered");
        assert_eq!(job.opord_id, opord_id);
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped_does_not_panic() {
        let (queue, rx) = analysis_channel();
        drop(rx);
        queue.enqueue(AnalysisJob {
            opord_id: Uuid::new_v4(),
        });
    }

    #[test]
    fn test_job_message_serialization() {
        let job = AnalysisJob {
            opord_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let parsed: AnalysisJob = serde_json::from_str(&json).unwrap();
        assert_eq!(job.opord_id, parsed.opord_id);
    }
}
