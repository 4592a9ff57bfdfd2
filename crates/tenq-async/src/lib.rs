//! Tokio adapter for `tenq-core`.
//!
//! The core manager blocks on backpressure and on empty-system waits, so
//! this crate bridges it onto Tokio without stalling runtime workers:
//! - `AsyncManager` for submit/take operations via `spawn_blocking`
//! - `WorkerReceiver` backed by a dedicated dequeue thread
//! - `TaskStream` exposing takes as a `Stream`
//! - `Dispatcher` running the worker loop with bounded in-flight execution

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;

use futures_core::Stream;
pub use tenq_core::{
    ManagerStats, ProvisionError, SchedulingStrategy, SubmitError, TakeError, TenantConfig,
    TenantId, TenantTask, Work, WorkQueueManager,
};
use tokio::sync::{mpsc, Semaphore};

const WORKER_TAKE_TIMEOUT: Duration = Duration::from_millis(25);

/// Async wrapper around [`WorkQueueManager`].
pub struct AsyncManager<T> {
    inner: Arc<WorkQueueManager<T>>,
}

impl<T> Clone for AsyncManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> AsyncManager<T> {
    /// Wraps a shared core manager.
    pub fn new(inner: Arc<WorkQueueManager<T>>) -> Self {
        Self { inner }
    }

    /// Returns the shared core manager.
    pub fn inner(&self) -> &Arc<WorkQueueManager<T>> {
        &self.inner
    }
}

impl<T: Send + 'static> AsyncManager<T> {
    /// Builds a manager and wraps it in one step.
    pub fn build(
        tenant_configs: Vec<TenantConfig>,
        strategy: SchedulingStrategy,
    ) -> Result<Self, ProvisionError> {
        Ok(Self::new(Arc::new(WorkQueueManager::new(
            tenant_configs,
            strategy,
        )?)))
    }

    /// Submits a task, running the potentially blocking backpressure wait on
    /// a Tokio blocking thread.
    pub async fn submit_async(&self, task: TenantTask<T>) -> Result<(), SubmitError> {
        let manager = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || manager.submit_work(task)).await {
            Ok(result) => result,
            Err(_) => Err(SubmitError::Closed),
        }
    }

    /// Takes the next task on a Tokio blocking thread.
    pub async fn take_async(&self) -> Result<TenantTask<T>, TakeError> {
        let manager = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || manager.take_work()).await {
            Ok(result) => result,
            Err(_) => Err(TakeError::Closed),
        }
    }

    /// Provisions a tenant against the live system.
    pub fn provision_tenant(&self, config: TenantConfig) -> Result<(), ProvisionError> {
        self.inner.provision_tenant(config)
    }

    /// Deprovisions a tenant, returning the discarded backlog size.
    pub fn deprovision_tenant(&self, tenant: &TenantId) -> Result<usize, ProvisionError> {
        self.inner.deprovision_tenant(tenant)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ManagerStats {
        self.inner.stats()
    }

    /// Closes the manager; all blocked and future calls report `Closed`.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns a receiver backed by a dedicated dequeue worker thread.
    pub fn receiver_with_worker(&self, buffer: usize) -> WorkerReceiver<T> {
        WorkerReceiver::new(self.clone(), buffer)
    }

    /// Returns a `Stream` of taken tasks.
    pub fn stream(&self) -> TaskStream<T> {
        TaskStream::new(self.clone())
    }
}

struct WorkerThreadHandle {
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WorkerThreadHandle {
    fn new(shutdown: Arc<AtomicBool>, handle: thread::JoinHandle<()>) -> Self {
        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }
}

impl Drop for WorkerThreadHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let mut guard = self.handle.lock().expect("worker handle mutex poisoned");
        if let Some(handle) = guard.take() {
            let _ = handle.join();
        }
    }
}

/// Receiver/stream adapter backed by a dedicated dequeue worker thread.
///
/// The thread loops on a short take timeout so it notices shutdown promptly;
/// dropping the receiver joins it.
pub struct WorkerReceiver<T> {
    rx: mpsc::Receiver<TenantTask<T>>,
    _worker: WorkerThreadHandle,
}

impl<T: Send + 'static> WorkerReceiver<T> {
    /// Spawns the dequeue worker feeding a channel of `buffer` capacity.
    pub fn new(manager: AsyncManager<T>, buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (tx, rx) = mpsc::channel(buffer);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = Arc::clone(&shutdown);
        let core = Arc::clone(manager.inner());

        let handle = thread::spawn(move || {
            while !worker_shutdown.load(Ordering::Acquire) {
                match core.take_work_timeout(WORKER_TAKE_TIMEOUT) {
                    Ok(Some(task)) => {
                        if tx.blocking_send(task).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(TakeError::Closed) => break,
                }
            }
        });

        Self {
            rx,
            _worker: WorkerThreadHandle::new(shutdown, handle),
        }
    }

    /// Waits for the next task, returning `None` once the worker stops.
    pub async fn recv(&mut self) -> Option<TenantTask<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for WorkerReceiver<T> {
    fn drop(&mut self) {
        self.rx.close();
    }
}

impl<T> Stream for WorkerReceiver<T> {
    type Item = TenantTask<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// `Stream` adapter over repeated async takes.
pub struct TaskStream<T> {
    manager: AsyncManager<T>,
    pending: Option<Pin<Box<dyn Future<Output = Result<TenantTask<T>, TakeError>> + Send>>>,
}

impl<T> TaskStream<T> {
    pub fn new(manager: AsyncManager<T>) -> Self {
        Self {
            manager,
            pending: None,
        }
    }
}

impl<T: Send + 'static> Stream for TaskStream<T> {
    type Item = TenantTask<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let manager = this.manager.clone();
            this.pending = Some(Box::pin(async move { manager.take_async().await }));
        }

        let pending = match this.pending.as_mut() {
            Some(pending) => pending,
            None => return Poll::Pending,
        };

        match pending.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                this.pending = None;
                match result {
                    Ok(task) => Poll::Ready(Some(task)),
                    Err(TakeError::Closed) => Poll::Ready(None),
                }
            }
        }
    }
}

/// Worker-pool collaborator: loops on take, executes each task with the
/// provided async handler, and bounds in-flight executions with a semaphore.
///
/// Each execution runs in its own spawned task, so a panic inside a handler
/// never reaches the queue manager or stalls the loop.
pub struct Dispatcher<T> {
    manager: AsyncManager<T>,
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
}

impl<T> Dispatcher<T> {
    /// Creates a dispatcher with bounded in-flight handler executions.
    pub fn new(manager: AsyncManager<T>, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            manager,
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Runs the take-then-execute loop until the manager closes, then waits
    /// for in-flight handlers to finish.
    pub async fn run<F, Fut>(&self, handler: F)
    where
        F: Fn(TenantTask<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        loop {
            match self.manager.take_async().await {
                Ok(task) => {
                    let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler(task).await;
                        drop(permit);
                    });
                }
                Err(TakeError::Closed) => break,
            }
        }

        let _ = self.semaphore.acquire_many(self.max_in_flight as u32).await;
    }
}

impl<T: Work + Send + 'static> Dispatcher<T> {
    /// Runs executable payloads directly: each take is followed by
    /// `Work::run` on a blocking thread. Failures inside `run` are the
    /// task's own concern and never surface back into the manager.
    pub async fn run_work(&self) {
        self.run(|task| async move {
            tracing::trace!(tenant = %task.tenant, desc = task.task.description(), "executing task");
            let _ = tokio::task::spawn_blocking(move || task.task.run()).await;
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn configs(ids: &[&str]) -> Vec<TenantConfig> {
        ids.iter()
            .map(|id| TenantConfig::new(*id, format!("{id}-name"), 64))
            .collect()
    }

    fn manager(ids: &[&str]) -> AsyncManager<u64> {
        AsyncManager::build(configs(ids), SchedulingStrategy::FairQueueing).expect("manager")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_and_take_roundtrip() {
        let manager = manager(&["a"]);
        manager
            .submit_async(TenantTask::new("a", 7))
            .await
            .unwrap();

        let got = manager.take_async().await.unwrap();
        assert_eq!(got.tenant, TenantId::from("a"));
        assert_eq!(got.task, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_tenant_propagates_through_adapter() {
        let manager = manager(&["a"]);
        let err = manager
            .submit_async(TenantTask::new("ghost", 1))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::UnknownTenant(TenantId::from("ghost")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_yields_tasks() {
        let manager = manager(&["a"]);
        manager.submit_async(TenantTask::new("a", 11)).await.unwrap();

        let mut stream = manager.stream();
        let got = stream.next().await.expect("stream item");
        assert_eq!(got.task, 11);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_receiver_observes_fair_order() {
        let manager = manager(&["a", "b"]);
        manager.submit_async(TenantTask::new("a", 1)).await.unwrap();
        manager.submit_async(TenantTask::new("a", 2)).await.unwrap();
        manager.submit_async(TenantTask::new("b", 3)).await.unwrap();
        manager.submit_async(TenantTask::new("b", 4)).await.unwrap();

        let mut receiver = manager.receiver_with_worker(16);
        let mut observed = Vec::new();
        for _ in 0..4 {
            let got = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
                .await
                .expect("worker recv timed out")
                .expect("expected task");
            observed.push((got.tenant.as_str().to_string(), got.task));
        }

        assert_eq!(
            observed,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 3),
                ("a".to_string(), 2),
                ("b".to_string(), 4),
            ]
        );
        manager.close();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_receiver_drop_joins_promptly() {
        let manager = manager(&["a"]);
        let start = Instant::now();
        {
            let _receiver = manager.receiver_with_worker(8);
        }
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "worker drop should join promptly"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dispatcher_survives_handler_panic() {
        let manager = manager(&["a"]);
        manager.submit_async(TenantTask::new("a", 1)).await.unwrap();
        manager.submit_async(TenantTask::new("a", 2)).await.unwrap();

        let dispatcher = Dispatcher::new(manager.clone(), 1);
        let served = Arc::new(AtomicU64::new(0));
        let served_clone = Arc::clone(&served);

        let runner = tokio::spawn(async move {
            dispatcher
                .run(move |task| {
                    let served = Arc::clone(&served_clone);
                    async move {
                        if task.task == 1 {
                            panic!("simulated task failure");
                        }
                        served.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        manager.close();
        let _ = runner.await;

        assert_eq!(
            served.load(Ordering::Relaxed),
            1,
            "second task should execute despite panic in first task"
        );
    }

    struct Probe {
        hits: Arc<AtomicU64>,
    }

    impl Work for Probe {
        fn run(&self) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        fn description(&self) -> &str {
            "probe"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_work_executes_payloads() {
        let manager: AsyncManager<Probe> =
            AsyncManager::build(configs(&["a"]), SchedulingStrategy::FairQueueing).unwrap();
        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            manager
                .submit_async(TenantTask::new(
                    "a",
                    Probe {
                        hits: Arc::clone(&hits),
                    },
                ))
                .await
                .unwrap();
        }

        let dispatcher = Dispatcher::new(manager.clone(), 2);
        let runner = tokio::spawn(async move { dispatcher.run_work().await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.close();
        let _ = runner.await;

        assert_eq!(hits.load(Ordering::Relaxed), 3);
    }
}
