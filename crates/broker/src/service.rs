//! Async single-writer service
//!
//! [`BrokerService::spawn`] moves a [`Broker`] into one tokio task. Mutations
//! are queued on a bounded channel and run one at a time; the GC timer runs in
//! the same task so its deletes are serialized with everything else. After
//! every step the task publishes a fresh immutable snapshot of the registries,
//! which readers use without ever reaching the writer.

use crate::broker::Broker;
use crate::claim::Claimed;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::gc::GcReport;
use crate::id::ClaimRange;
use crate::log::{Commit, Committed};
use crate::proc::{Proc, ProcOptions};
use crate::range::{self, LogEntry, RangeQuery};
use crate::state::BrokerState;
use crate::system_proc::{SystemProc, SystemProcSpec};
use parking_lot::{Mutex, RwLock};
use proven_kvstore::OrderedStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Deferred delivery of a job's result to its caller
type Reply = Box<dyn FnOnce() + Send>;

/// Runs against the broker and hands back the reply to deliver once the new
/// snapshot is visible
type Job = Box<dyn FnOnce(&mut Broker) -> Reply + Send>;

/// Read-only view of the registries as of the last completed write
pub type BrokerSnapshot = Arc<BrokerState>;

pub struct BrokerService;

impl BrokerService {
    /// Start the writer task; must be called inside a tokio runtime
    pub fn spawn(broker: Broker) -> BrokerHandle {
        let config = broker.config().clone();
        let store = broker.store().clone();
        let snapshot = Arc::new(RwLock::new(Arc::new(broker.state().clone())));
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            broker,
            commands_rx,
            shutdown_rx,
            snapshot.clone(),
        ));

        BrokerHandle {
            commands: commands_tx,
            snapshot,
            store,
            config,
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

async fn run(
    mut broker: Broker,
    mut commands: mpsc::Receiver<Job>,
    mut shutdown: oneshot::Receiver<()>,
    snapshot: Arc<RwLock<BrokerSnapshot>>,
) {
    let mut gc = tokio::time::interval(broker.config().gc_period());
    gc.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    gc.tick().await;

    tracing::info!("Broker service started");
    loop {
        let reply = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            job = commands.recv() => match job {
                Some(job) => Some(job(&mut broker)),
                None => break,
            },
            _ = gc.tick() => {
                if let Err(e) = broker.collect_garbage() {
                    tracing::warn!("GC pass failed: {}", e);
                }
                None
            }
        };
        *snapshot.write() = Arc::new(broker.state().clone());
        // Callers only wake after the snapshot reflects their write
        if let Some(reply) = reply {
            reply();
        }
    }
    tracing::info!("Broker service stopped");
}

/// Cloneable handle to a running [`BrokerService`]
#[derive(Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<Job>,
    snapshot: Arc<RwLock<BrokerSnapshot>>,
    store: Arc<dyn OrderedStore>,
    config: BrokerConfig,
    shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl BrokerHandle {
    /// Queue `op` behind every earlier write and wait for its result
    pub async fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Broker) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |broker| {
            let result = op(broker);
            let reply: Reply = Box::new(move || {
                let _ = reply_tx.send(result);
            });
            reply
        });
        self.commands
            .send(job)
            .await
            .map_err(|_| BrokerError::BrokerStopped)?;
        reply_rx.await.map_err(|_| BrokerError::BrokerStopped)?
    }

    pub async fn commit(&self, commit: impl Into<Commit>) -> Result<Committed> {
        let commit = commit.into();
        self.call(move |broker| broker.commit(commit)).await
    }

    pub async fn claim(&self, options: ProcOptions) -> Result<Option<Claimed>> {
        self.call(move |broker| broker.claim(&options)).await
    }

    pub async fn get_available_proc(
        &self,
        candidates: Vec<ProcOptions>,
    ) -> Result<Option<Claimed>> {
        self.call(move |broker| broker.get_available_proc(&candidates))
            .await
    }

    pub async fn ack(&self, name: impl Into<String>) -> Result<Option<ClaimRange>> {
        let name = name.into();
        self.call(move |broker| broker.ack(&name)).await
    }

    pub async fn ack_commit(
        &self,
        name: impl Into<String>,
        commit: impl Into<Commit>,
    ) -> Result<(Option<ClaimRange>, Committed)> {
        let name = name.into();
        let commit = commit.into();
        self.call(move |broker| broker.ack_commit(&name, commit))
            .await
    }

    pub async fn reclaim(&self, name: impl Into<String>) -> Result<ClaimRange> {
        let name = name.into();
        self.call(move |broker| broker.reclaim(&name)).await
    }

    pub async fn disable_proc(&self, name: impl Into<String>) -> Result<Proc> {
        let name = name.into();
        self.call(move |broker| broker.disable_proc(&name)).await
    }

    pub async fn resume_proc(&self, name: impl Into<String>) -> Result<Proc> {
        let name = name.into();
        self.call(move |broker| broker.resume_proc(&name)).await
    }

    pub async fn destroy_proc(&self, name: impl Into<String>) -> Result<Proc> {
        let name = name.into();
        self.call(move |broker| broker.destroy_proc(&name)).await
    }

    pub async fn create_system_proc(&self, spec: SystemProcSpec) -> Result<Vec<SystemProc>> {
        self.call(move |broker| broker.create_system_proc(spec))
            .await
    }

    pub async fn destroy_system_proc(&self, name: impl Into<String>) -> Result<SystemProc> {
        let name = name.into();
        self.call(move |broker| broker.destroy_system_proc(&name))
            .await
    }

    /// Run a GC pass now instead of waiting for the timer
    pub async fn collect_garbage(&self) -> Result<GcReport> {
        self.call(|broker| broker.collect_garbage()).await
    }

    /// Registries as of the last completed write
    pub fn snapshot(&self) -> BrokerSnapshot {
        self.snapshot.read().clone()
    }

    /// Range read that does not queue behind writes
    pub fn range(&self, query: &RangeQuery) -> Result<Vec<LogEntry>> {
        let snapshot = self.snapshot();
        range::get_range(self.store.as_ref(), &snapshot.topics, query)
    }

    pub fn inspect_proc(&self, name: &str) -> Result<Proc> {
        self.snapshot()
            .procs
            .get(name)
            .cloned()
            .ok_or(BrokerError::InvalidProc)
    }

    /// Wait until every named proc (every proc when `names` is empty) has
    /// acked up to its topic's current tone
    ///
    /// There is no timeout; wrap the call in `tokio::time::timeout` to bound it.
    pub async fn wait_for_procs(&self, names: &[String]) {
        let period = self.config.poll_period();
        while !self.snapshot().procs_caught_up(names) {
            tokio::time::sleep(period).await;
        }
    }

    /// Stop the writer after the command in flight and wait for it to exit
    ///
    /// Commands still queued fail with `broker_stopped`.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!("Broker service task failed: {:?}", e);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_tx.lock().is_none()
    }
}
