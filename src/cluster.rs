//! Cluster bootstrap.
//!
//! [`Cluster::run`] brings up N workers and blocks until the cluster stops.
//! Each worker is one OS thread running a single-threaded cooperative
//! scheduler; the bootstrap creates the one shared directory before any
//! worker starts, prepares the socket directory, and sequences every worker
//! through bind, the readiness barrier, peer connection, and the user's
//! start callback.
//!
//! ```rust,no_run
//! use meshwork::prelude::*;
//!
//! # fn main() -> Result<(), ClusterError> {
//! let config = ClusterConfig::new(4, "/tmp/meshwork");
//! let cluster: Cluster<String> = Cluster::new(config)?
//!     .on_worker_start(|node| {
//!         tracing::info!(worker = node.worker_id(), "worker ready");
//!     });
//! cluster.run()?;
//! # Ok(())
//! # }
//! ```

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::LocalSet;
use tokio::time::Instant;

use crate::actor::{ActorSystem, ShutdownSignal};
use crate::directory::SharedDirectory;
use crate::error::ClusterError;
use crate::node::ClusterNode;
use crate::ring::{HashRing, DEFAULT_REPLICAS};
use crate::serializer::{JsonSerializer, Serializer};
use crate::transport::MeshTransport;
use crate::WorkerId;

/// Default directory capacity when none is configured.
pub const DEFAULT_TABLE_SIZE: usize = 1024;

/// How often a worker re-checks the readiness entries while waiting for the
/// rest of the cluster to bind.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long a worker waits for the rest of the cluster before giving up.
const READY_DEADLINE: Duration = Duration::from_secs(10);

/// Cluster configuration record.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of peer workers, at least 1.
    pub worker_count: u32,
    /// Directory capacity in entries. Startup itself uses one readiness
    /// entry per worker, so size this above `worker_count`.
    pub table_size: usize,
    /// Directory holding the workers' listening sockets. Created if missing.
    pub socket_dir: PathBuf,
}

impl ClusterConfig {
    /// Configuration with the default directory capacity.
    pub fn new(worker_count: u32, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            worker_count,
            table_size: DEFAULT_TABLE_SIZE,
            socket_dir: socket_dir.into(),
        }
    }

    /// Override the directory capacity.
    pub fn with_table_size(mut self, table_size: usize) -> Self {
        self.table_size = table_size;
        self
    }

    fn validate(&self) -> Result<(), ClusterError> {
        if self.worker_count == 0 {
            return Err(ClusterError::InvalidWorkerCount);
        }
        if self.table_size == 0 {
            return Err(ClusterError::InvalidTableSize);
        }
        Ok(())
    }
}

type StartFn<M> = Arc<dyn Fn(ClusterNode<M>) + Send + Sync>;

/// A configured cluster, ready to run.
pub struct Cluster<M> {
    config: ClusterConfig,
    serializer: Arc<dyn Serializer<M>>,
    on_worker_start: Option<StartFn<M>>,
    shutdown: ShutdownSignal,
}

impl<M> Cluster<M>
where
    M: Serialize + DeserializeOwned + 'static,
{
    /// Create a cluster using the JSON serializer for message payloads.
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        Self::new_with_serializer(config, JsonSerializer::new())
    }
}

impl<M: 'static> Cluster<M> {
    /// Create a cluster with an explicit payload serializer, for message
    /// types that don't use the JSON default.
    pub fn new_with_serializer(
        config: ClusterConfig,
        serializer: impl Serializer<M> + 'static,
    ) -> Result<Self, ClusterError> {
        config.validate()?;
        Ok(Self {
            config,
            serializer: Arc::new(serializer),
            on_worker_start: None,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Replace the payload serializer.
    pub fn with_serializer(mut self, serializer: impl Serializer<M> + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Install the worker start callback.
    ///
    /// Invoked exactly once per worker, on that worker's thread, with the
    /// fully wired node, right before the actor system starts running. This
    /// is where applications spawn their initial actors. The callback runs
    /// inside the worker's `LocalSet`, so it may `tokio::task::spawn_local`
    /// follow-up work; it must not block beyond what spawning requires.
    pub fn on_worker_start(mut self, callback: impl Fn(ClusterNode<M>) + Send + Sync + 'static) -> Self {
        self.on_worker_start = Some(Arc::new(callback));
        self
    }

    /// Handle that stops the cluster when triggered, from any thread.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run the cluster and block until every worker has exited.
    ///
    /// A worker that fails during startup or running triggers a
    /// cluster-wide shutdown; the first causal error is returned.
    pub fn run(self) -> Result<(), ClusterError> {
        let Cluster {
            config,
            serializer,
            on_worker_start,
            shutdown,
        } = self;

        let directory = SharedDirectory::new(config.table_size);
        prepare_socket_dir(&config.socket_dir)?;
        tracing::info!(
            workers = config.worker_count,
            socket_dir = %config.socket_dir.display(),
            "starting cluster"
        );

        let mut handles = Vec::with_capacity(config.worker_count as usize);
        let mut first_error = None;
        for worker_id in 0..config.worker_count {
            let ctx = WorkerContext {
                worker_id,
                config: config.clone(),
                directory: directory.clone(),
                serializer: Arc::clone(&serializer),
                on_worker_start: on_worker_start.clone(),
                shutdown: shutdown.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || worker_main(ctx));
            match spawned {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(error) => {
                    shutdown.trigger();
                    record_error(&mut first_error, ClusterError::Io(error));
                    break;
                }
            }
        }

        for (worker_id, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(worker = worker_id, %error, "worker exited with error");
                    record_error(&mut first_error, error);
                }
                Err(_) => {
                    shutdown.trigger();
                    tracing::error!(worker = worker_id, "worker thread panicked");
                    record_error(&mut first_error, ClusterError::WorkerPanicked { worker: worker_id });
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => {
                tracing::info!("cluster stopped");
                Ok(())
            }
        }
    }
}

/// Everything one worker thread needs to run.
struct WorkerContext<M> {
    worker_id: WorkerId,
    config: ClusterConfig,
    directory: SharedDirectory,
    serializer: Arc<dyn Serializer<M>>,
    on_worker_start: Option<StartFn<M>>,
    shutdown: ShutdownSignal,
}

fn worker_main<M: 'static>(ctx: WorkerContext<M>) -> Result<(), ClusterError> {
    let worker_id = ctx.worker_id;
    let shutdown = ctx.shutdown.clone();
    let result = run_worker(ctx);
    if let Err(ref error) = result {
        tracing::error!(worker = worker_id, %error, "worker failed; shutting cluster down");
        shutdown.trigger();
    }
    result
}

fn run_worker<M: 'static>(ctx: WorkerContext<M>) -> Result<(), ClusterError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let transport = MeshTransport::new(
            ctx.worker_id,
            ctx.config.worker_count,
            ctx.config.socket_dir.clone(),
        );
        let result = drive_worker(&ctx, transport.clone()).await;
        // Tear the transport down on every exit path so the socket file is
        // unlinked even when startup failed partway.
        transport.close().await;
        result
    })
}

async fn drive_worker<M: 'static>(
    ctx: &WorkerContext<M>,
    transport: MeshTransport,
) -> Result<(), ClusterError> {
    let ring = HashRing::new(ctx.config.worker_count, DEFAULT_REPLICAS);
    let system = ActorSystem::new(format!("worker-{}", ctx.worker_id), ctx.shutdown.clone());

    transport.bind()?;
    ctx.directory
        .register(&readiness_path(ctx.worker_id), ctx.worker_id);
    await_cluster_ready(&ctx.directory, ctx.config.worker_count, &ctx.shutdown).await?;
    transport.connect_to_peers().await?;

    let node = ClusterNode::new(
        ctx.worker_id,
        system.clone(),
        transport,
        ring,
        Arc::clone(&ctx.serializer),
        ctx.directory.clone(),
    );
    node.start();
    tracing::debug!(worker = ctx.worker_id, "worker online");

    if let Some(callback) = &ctx.on_worker_start {
        callback(node.clone());
    }

    system.run().await;
    Ok(())
}

/// Block until every worker has registered its readiness entry.
///
/// Each worker writes `__ready/{id}` into the shared directory right after
/// binding; connecting before every entry is present would race the peers'
/// bind calls.
async fn await_cluster_ready(
    directory: &SharedDirectory,
    worker_count: u32,
    shutdown: &ShutdownSignal,
) -> Result<(), ClusterError> {
    let deadline = Instant::now() + READY_DEADLINE;
    loop {
        let missing = (0..worker_count)
            .filter(|worker| !directory.has(&readiness_path(*worker)))
            .count();
        if missing == 0 {
            return Ok(());
        }
        if shutdown.is_triggered() {
            return Err(ClusterError::StartupAborted);
        }
        if Instant::now() >= deadline {
            return Err(ClusterError::BarrierTimeout {
                missing,
                total: worker_count,
            });
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

fn readiness_path(worker: WorkerId) -> String {
    format!("__ready/{worker}")
}

fn prepare_socket_dir(path: &Path) -> Result<(), ClusterError> {
    std::fs::create_dir_all(path).map_err(|source| ClusterError::SocketDir {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        ClusterError::SocketDir {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(())
}

/// Prefer root causes over startup-abort echoes from other workers.
fn record_error(slot: &mut Option<ClusterError>, error: ClusterError) {
    match slot {
        None => *slot = Some(error),
        Some(ClusterError::StartupAborted)
            if !matches!(error, ClusterError::StartupAborted) =>
        {
            *slot = Some(error)
        }
        _ => {}
    }
}
