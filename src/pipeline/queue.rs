//! Per-signer serialization of pipeline runs.

use std::sync::Arc;

use tokio::sync::Mutex;

/// Serializes every pipeline invocation that shares one signing key.
///
/// The signer's sequence number becomes stale the moment any other
/// transaction from the same signer lands; two concurrent callers that
/// both build against sequence N guarantee one rejection. The queue runs
/// tasks strictly one at a time in FIFO submission order (the underlying
/// lock is fair), and a failing task simply releases its slot.
///
/// One queue instance belongs to one signer handle. This only serializes
/// callers within a single process; two processes sharing the same
/// signing key still race and that deployment shape is unsupported.
#[derive(Clone, Default)]
pub struct SignerQueue {
    slot: Arc<Mutex<()>>,
}

impl SignerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every previously enqueued task has finished.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _slot = self.slot.lock().await;
        task.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn runs_tasks_in_fifo_order() {
        let queue = SignerQueue::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .run(async move {
                        // Earlier tasks sleep longer; FIFO order must hold anyway.
                        tokio::time::sleep(Duration::from_millis(u64::from(8 - i))).await;
                        order.lock().unwrap().push(i);
                    })
                    .await;
            }));
            // Give each spawn a chance to reach the lock before the next.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn failing_task_does_not_block_successors() {
        let queue = SignerQueue::new();

        let failed: Result<(), &str> = queue.run(async { Err("boom") }).await;
        assert!(failed.is_err());

        let succeeded = queue.run(async { 42 }).await;
        assert_eq!(succeeded, 42);
    }

    #[tokio::test]
    async fn tasks_on_different_queues_interleave() {
        let a = SignerQueue::new();
        let b = SignerQueue::new();

        // Queue A is held; queue B must still make progress.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let a_clone = a.clone();
        let holder = tokio::spawn(async move {
            a_clone
                .run(async move {
                    let _ = rx.await;
                })
                .await;
        });
        tokio::task::yield_now().await;

        let value = tokio::time::timeout(Duration::from_secs(1), b.run(async { 7 }))
            .await
            .expect("independent queue must not be blocked");
        assert_eq!(value, 7);

        tx.send(()).unwrap();
        holder.await.unwrap();
    }
}
