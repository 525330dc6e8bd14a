//! AMF application lifecycle
//!
//! Builds the one [`AmfContext`], starts the worker pool, the timer
//! supervisor and the inactivity sweep, and owns the NGAP listener. Shutdown
//! stops accepting, closes every association so that registry cleanup runs,
//! drains the UE work queues and stops the workers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ngc_core::{Clock, SystemClock};
use ngc_sctp::{SctpConfig, SctpListener};
use tokio::task::JoinHandle;

use crate::config::AmfConfig;
use crate::context::AmfContext;
use crate::error::AmfResult;
use crate::ngap_path;
use crate::subscriber::{MemorySubscriberStore, SubscriberStore};
use crate::timer::{self, TIMER_TICK};
use crate::transport::{memory_pair, MemoryPeer};
use crate::upf::{PoolUpf, UpfControl};
use crate::worker::{self, AmfWorkers, WorkItem};

/// How long shutdown waits for associations to clean up and queues to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Poll period of the running flag
const RUN_POLL: Duration = Duration::from_millis(100);

/// Upper bound on the inactivity sweep period
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// AMF application state
pub struct AmfApp {
    ctx: Arc<AmfContext>,
    workers: AmfWorkers,
    running: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

impl AmfApp {
    /// AMF with subscribers and the user plane pool taken from `config`.
    /// Must be called inside a Tokio runtime.
    pub fn new(config: AmfConfig) -> AmfResult<Self> {
        let subscribers = MemorySubscriberStore::from_config(&config)?;
        let upf = PoolUpf::from_config(&config.upf)?;
        Self::with_parts(config, Arc::new(subscribers), Arc::new(upf), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: AmfConfig,
        subscribers: Arc<dyn SubscriberStore>,
        upf: Arc<dyn UpfControl>,
        clock: Arc<dyn Clock>,
    ) -> AmfResult<Self> {
        config.validate()?;
        let ctx = Arc::new(AmfContext::new(config, subscribers, upf, clock)?);
        let workers = worker::start_workers(ctx.clone());

        let mut background = Vec::with_capacity(2);
        let timer_ctx = ctx.clone();
        let timer_workers = workers.clone();
        background.push(tokio::spawn(async move {
            timer_ctx
                .timers
                .run(TIMER_TICK, |expired| {
                    let key = expired.key;
                    if let Err(e) = timer_workers.submit(key.amf_ue_ngap_id, WorkItem::Timer(expired)) {
                        log::warn!("{} expiry dropped (amf_ue_ngap_id={}): {}", key.timer, key.amf_ue_ngap_id, e);
                    }
                })
                .await
        }));

        let sweep_ctx = ctx.clone();
        let period = Duration::from_secs(ctx.config.ue_inactivity_secs.max(1)).min(MAX_SWEEP_PERIOD);
        background.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = timer::sweep_inactive(&sweep_ctx).await;
                if removed > 0 {
                    log::info!("{} inactive UE context(s) removed", removed);
                }
            }
        }));

        log::info!("[{}] AMF initialized", ctx.config.amf_name);
        Ok(Self { ctx, workers, running: Arc::new(AtomicBool::new(true)), listener: None, background })
    }

    pub fn context(&self) -> &Arc<AmfContext> {
        &self.ctx
    }

    pub fn workers(&self) -> &AmfWorkers {
        &self.workers
    }

    /// Bind the NGAP SCTP listener and start accepting gNBs.
    /// Returns the bound address.
    pub fn start_ngap(&mut self, addr: SocketAddr) -> AmfResult<SocketAddr> {
        let ngap = &self.ctx.config.ngap;
        let config = SctpConfig {
            max_outbound_streams: ngap.outbound_streams,
            max_inbound_streams: ngap.inbound_streams,
            ..SctpConfig::default()
        };
        let listener = SctpListener::bind(addr, config)?;
        let local = listener.local_addr();
        self.listener = Some(tokio::spawn(ngap_path::accept_loop(self.ctx.clone(), self.workers.clone(), listener)));
        Ok(local)
    }

    /// Attach an in-process RAN association; the returned peer plays the gNB
    pub fn connect_memory(&self, peer: SocketAddr, outbound_streams: u16) -> MemoryPeer {
        let (transport, gnb) = memory_pair(peer, outbound_streams);
        tokio::spawn(ngap_path::serve_association(self.ctx.clone(), self.workers.clone(), transport));
        gnb
    }

    /// Flag cleared by the signal handler
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn run_until_stopped(&self) {
        log::info!("AMF running...");
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(RUN_POLL).await;
        }
    }

    pub async fn shutdown(&mut self) {
        log::info!("AMF shutting down...");
        self.stop();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }

        let handles = self.ctx.connections.handles();
        for handle in &handles {
            self.ctx.connections.close(*handle);
        }
        // Association tasks notice the close and clean up the registry
        let cleaned = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while !self.ctx.ran.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if cleaned.is_err() {
            log::warn!("{} RAN context(s) still registered at shutdown", self.ctx.ran.len());
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.workers.drain()).await.is_err() {
            log::warn!("{} work item(s) still pending at shutdown", self.workers.pending());
        }
        self.workers.stop();
        for task in self.background.drain(..) {
            task.abort();
        }
        log::info!("AMF shutdown complete ({} association(s) closed)", handles.len());
    }
}

impl Drop for AmfApp {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        for task in self.background.drain(..) {
            task.abort();
        }
        self.workers.stop();
    }
}
