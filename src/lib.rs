//! Meshwork: a single-host actor cluster runtime.
//!
//! Meshwork runs N peer workers on one machine, each hosting an independent
//! actor system, and routes messages between them so an application can
//! address any actor by a logical path without knowing which worker owns it.
//!
//! # Core Concepts
//!
//! - **Workers**: N peers, each a single-threaded cooperative scheduler on
//!   its own OS thread, with stable integer ids assigned at bootstrap.
//! - **Full-mesh transport**: every worker binds one Unix-domain socket and
//!   connects to every peer; frames are length-prefixed and reassembled by
//!   buffered per-connection read loops.
//! - **Placement ring**: a consistent-hash ring, identical on every worker,
//!   maps actor paths to their owning worker deterministically.
//! - **Shared directory**: one cluster-wide path-to-owner table; the first
//!   send to an unknown path claims its placement for the cluster lifetime.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Cluster (bootstrap) ───────────────────────────┐
//! │  shared directory ── socket dir ── N worker threads                        │
//! └────────┬───────────────────────────────────────────────────┬───────────────┘
//!          ▼                                                   ▼
//! ┌─ worker 0 ────────────────────┐                 ┌─ worker N-1 ──────────┐
//! │ ClusterNode                   │                 │ ClusterNode           │
//! │  ├─ ActorSystem (mailboxes)   │   unix socket   │  ├─ ActorSystem       │
//! │  ├─ HashRing (placement)      │◄───full mesh───►│  ├─ HashRing          │
//! │  └─ MeshTransport (frames)    │                 │  └─ MeshTransport     │
//! └───────────────────────────────┘                 └───────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use meshwork::prelude::*;
//!
//! struct Greeter;
//!
//! impl Actor<String> for Greeter {
//!     fn receive(&mut self, message: String) {
//!         tracing::info!(%message, "greeted");
//!     }
//! }
//!
//! fn main() -> Result<(), ClusterError> {
//!     let config = ClusterConfig::new(2, "/tmp/meshwork-demo");
//!     let cluster: Cluster<String> = Cluster::new(config)?.on_worker_start(|node| {
//!         // Spawn actors the ring places on this worker; sends from any
//!         // worker are routed here over the mesh.
//!         if node.ring().node_for("greeter") == node.worker_id() {
//!             node.spawn(Props::new(|| Greeter), "greeter").unwrap();
//!         }
//!     });
//!     cluster.run()
//! }
//! ```

pub mod actor;
pub mod cluster;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod node;
pub mod prelude;
pub mod ring;
pub mod serializer;
pub mod transport;
pub mod wire;

/// Identifier of one worker, in `[0, worker_count)`, assigned at bootstrap
/// and stable for the life of the cluster.
pub type WorkerId = u32;
