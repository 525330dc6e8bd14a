//! UE work queues
//!
//! Association reader tasks decode NGAP and hand UE-associated messages to
//! a fixed pool of workers. Work is queued per key (the AMF UE NGAP ID): a
//! key is scheduled on at most one worker at a time, so items for one UE run
//! in submission order while different UEs run in parallel. A key whose
//! queue is full refuses new work instead of growing without bound.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ngc_core::Expired;
use ngc_ngap::NgapMessage;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::ngap_handler;
use crate::timer::{self, TimerKey, TimerPayload};
use crate::transport::ConnectionHandle;

// ============================================================================
// Work items
// ============================================================================

/// One unit of UE-associated work
#[derive(Debug)]
pub enum WorkItem {
    /// UE-associated NGAP message from a RAN
    Ngap { handle: ConnectionHandle, amf_ue_ngap_id: u64, message: NgapMessage },
    /// Expired NAS/NGAP procedure timer
    Timer(Expired<TimerKey, TimerPayload>),
}

impl WorkItem {
    /// Queue the item belongs to
    pub fn key(&self) -> u64 {
        match self {
            WorkItem::Ngap { amf_ue_ngap_id, .. } => *amf_ue_ngap_id,
            WorkItem::Timer(expired) => expired.key.amf_ue_ngap_id,
        }
    }
}

pub type AmfWorkers = WorkerPool<WorkItem>;

/// Run one work item against the context
pub async fn dispatch(ctx: Arc<AmfContext>, item: WorkItem) {
    match item {
        WorkItem::Ngap { handle, amf_ue_ngap_id, message } => {
            ngap_handler::handle_ue_message(&ctx, handle, amf_ue_ngap_id, message).await
        }
        WorkItem::Timer(expired) => timer::handle_expiry(&ctx, expired).await,
    }
}

/// Start the AMF worker pool over `ctx`
pub fn start_workers(ctx: Arc<AmfContext>) -> AmfWorkers {
    let pool_size = ctx.config.workers.pool_size;
    let queue_depth = ctx.config.workers.queue_depth;
    WorkerPool::start(pool_size, queue_depth, move |item| dispatch(ctx.clone(), item))
}

// ============================================================================
// Worker pool
// ============================================================================

struct PoolInner<T> {
    /// A key present here is either waiting in `ready` or being worked on
    queues: Mutex<HashMap<u64, VecDeque<T>>>,
    ready: mpsc::UnboundedSender<u64>,
    queue_depth: usize,
    pending: AtomicUsize,
    idle: Notify,
    stopped: AtomicBool,
}

impl<T> PoolInner<T> {
    fn queues(&self) -> MutexGuard<'_, HashMap<u64, VecDeque<T>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed set of tasks draining per-key FIFO queues
pub struct WorkerPool<T> {
    inner: Arc<PoolInner<T>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), workers: self.workers.clone() }
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `pool_size` workers running `handler` for every item
    pub fn start<F, Fut>(pool_size: usize, queue_depth: usize, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let ready_rx = Arc::new(tokio::sync::Mutex::new(ready_rx));
        let handler = Arc::new(handler);
        let inner = Arc::new(PoolInner {
            queues: Mutex::new(HashMap::new()),
            ready: ready_tx,
            queue_depth: queue_depth.max(1),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            stopped: AtomicBool::new(false),
        });

        let pool_size = pool_size.max(1);
        let workers = (0..pool_size)
            .map(|index| {
                let inner = inner.clone();
                let ready_rx = ready_rx.clone();
                let handler = handler.clone();
                tokio::spawn(async move { worker_loop(index, inner, ready_rx, handler).await })
            })
            .collect();
        log::debug!("Started {} workers, queue depth {}", pool_size, queue_depth);

        Self { inner, workers: Arc::new(Mutex::new(workers)) }
    }

    /// Queue `item` behind any earlier work for `key`
    pub fn submit(&self, key: u64, item: T) -> AmfResult<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(AmfError::ResourceExhausted("worker pool stopped".into()));
        }
        let mut queues = self.inner.queues();
        match queues.get_mut(&key) {
            Some(queue) => {
                if queue.len() >= self.inner.queue_depth {
                    return Err(AmfError::ResourceExhausted(format!(
                        "work queue of amf_ue_ngap_id={} is full ({} pending)",
                        key,
                        queue.len()
                    )));
                }
                queue.push_back(item);
                self.inner.pending.fetch_add(1, Ordering::SeqCst);
            }
            None => {
                queues.insert(key, VecDeque::from([item]));
                self.inner.pending.fetch_add(1, Ordering::SeqCst);
                if self.inner.ready.send(key).is_err() {
                    queues.remove(&key);
                    self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                    return Err(AmfError::ResourceExhausted("worker pool stopped".into()));
                }
            }
        }
        Ok(())
    }

    /// Items queued or running
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Wait until every submitted item has run
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Refuse new work and stop the workers; queued items are dropped
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            worker.abort();
        }
        let dropped: usize = self.inner.queues().drain().map(|(_, q)| q.len()).sum();
        self.inner.pending.store(0, Ordering::SeqCst);
        self.inner.idle.notify_waiters();
        if dropped > 0 {
            log::warn!("Worker pool stopped with {} queued item(s)", dropped);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

async fn worker_loop<T, F, Fut>(
    index: usize,
    inner: Arc<PoolInner<T>>,
    ready: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>>,
    handler: Arc<F>,
) where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let key = {
            let mut ready = ready.lock().await;
            match ready.recv().await {
                Some(key) => key,
                None => return,
            }
        };
        let item = inner.queues().get_mut(&key).and_then(|queue| queue.pop_front());
        let Some(item) = item else {
            continue;
        };

        // A panicking job only takes its own task down
        if let Err(e) = tokio::spawn(handler(item)).await {
            if e.is_panic() {
                log::error!("Worker {}: job for amf_ue_ngap_id={} panicked", index, key);
            }
        }

        {
            let mut queues = inner.queues();
            match queues.get(&key) {
                Some(queue) if !queue.is_empty() => {
                    // back of the line, behind other UEs
                    let _ = inner.ready.send(key);
                }
                _ => {
                    queues.remove(&key);
                }
            }
        }
        if inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.idle.notify_waiters();
        }
    }
}
