//! Cluster node facade.
//!
//! One [`ClusterNode`] per worker ties the pieces together: it resolves a
//! destination path to an owner through the directory (falling back to the
//! ring and claiming the path on first reference), delivers locally owned
//! messages straight into the actor system, and routes everything else over
//! the mesh transport as an [`Envelope`] frame.

use std::rc::Rc;
use std::sync::Arc;

use crate::actor::{ActorSystem, Props};
use crate::directory::SharedDirectory;
use crate::envelope::Envelope;
use crate::error::{ClusterError, EnvelopeError};
use crate::ring::HashRing;
use crate::serializer::Serializer;
use crate::transport::{FrameListener, MeshTransport};
use crate::WorkerId;

/// Per-worker routing facade over the actor system, transport, ring, and
/// directory. Cheap to clone within its worker.
pub struct ClusterNode<M> {
    inner: Rc<NodeInner<M>>,
}

impl<M> Clone for ClusterNode<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct NodeInner<M> {
    worker_id: WorkerId,
    system: ActorSystem<M>,
    transport: MeshTransport,
    ring: HashRing,
    serializer: Arc<dyn Serializer<M>>,
    directory: SharedDirectory,
}

impl<M: 'static> ClusterNode<M> {
    /// Assemble the node from its already-constructed parts.
    pub fn new(
        worker_id: WorkerId,
        system: ActorSystem<M>,
        transport: MeshTransport,
        ring: HashRing,
        serializer: Arc<dyn Serializer<M>>,
        directory: SharedDirectory,
    ) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                worker_id,
                system,
                transport,
                ring,
                serializer,
                directory,
            }),
        }
    }

    /// This worker's id.
    pub fn worker_id(&self) -> WorkerId {
        self.inner.worker_id
    }

    /// The local actor system.
    pub fn system(&self) -> &ActorSystem<M> {
        &self.inner.system
    }

    /// The shared directory handle.
    pub fn directory(&self) -> &SharedDirectory {
        &self.inner.directory
    }

    /// The placement ring.
    pub fn ring(&self) -> &HashRing {
        &self.inner.ring
    }

    /// The mesh transport.
    pub fn transport(&self) -> &MeshTransport {
        &self.inner.transport
    }

    /// Install the inbound listener: decode envelopes off the transport and
    /// deliver their payloads into the local actor system.
    ///
    /// Called once by the bootstrap, after `connect_to_peers` and before
    /// user code runs.
    pub fn start(&self) {
        let listener = NodeListener {
            worker_id: self.inner.worker_id,
            system: self.inner.system.clone(),
            serializer: Arc::clone(&self.inner.serializer),
        };
        self.inner.transport.set_listener(Rc::new(listener));
    }

    /// Spawn an actor at `path` on this worker.
    ///
    /// Refuses a path whose ring owner is a different worker: honoring the
    /// ring is what keeps two workers from ever registering conflicting
    /// owners for one path. Use [`spawn_pinned`] when placement is being
    /// overridden on purpose.
    ///
    /// [`spawn_pinned`]: ClusterNode::spawn_pinned
    pub fn spawn(&self, props: Props<M>, path: &str) -> Result<(), ClusterError> {
        let owner = self.inner.ring.node_for(path);
        if owner != self.inner.worker_id {
            return Err(ClusterError::MisplacedSpawn {
                path: path.to_string(),
                owner,
                worker: self.inner.worker_id,
            });
        }
        self.spawn_pinned(props, path)
    }

    /// Spawn an actor at `path` on this worker regardless of ring placement.
    ///
    /// The caller takes responsibility for ensuring no other worker claims
    /// the same path.
    pub fn spawn_pinned(&self, props: Props<M>, path: &str) -> Result<(), ClusterError> {
        self.inner.system.spawn(props, path)?;
        self.inner.directory.register(path, self.inner.worker_id);
        Ok(())
    }

    /// Stop the actor at `path` and release its directory entry.
    ///
    /// This is the only way a directory entry is removed.
    pub fn stop_actor(&self, path: &str) {
        if self.inner.system.stop(path) {
            self.inner.directory.remove(path);
        }
    }

    /// Route `message` to the actor at `path`, wherever it lives.
    ///
    /// The owner comes from the directory; a miss computes the ring owner
    /// and registers it, so the first send to an unknown path fixes its
    /// placement for the lifetime of the cluster. Locally owned messages go
    /// straight into the mailbox; remote ones are serialized into an
    /// envelope frame and sent over the mesh.
    pub async fn send(&self, path: &str, message: M) -> Result<(), ClusterError> {
        if path.is_empty() {
            return Err(EnvelopeError::EmptyPath.into());
        }

        let owner = match self.inner.directory.lookup(path) {
            Some(owner) => owner,
            None => {
                let owner = self.inner.ring.node_for(path);
                self.inner.directory.register(path, owner);
                tracing::debug!(
                    worker = self.inner.worker_id,
                    path,
                    owner,
                    "claimed path on first reference"
                );
                owner
            }
        };

        if owner == self.inner.worker_id {
            if !self.inner.system.deliver(path, message) {
                tracing::warn!(
                    worker = self.inner.worker_id,
                    path,
                    "no local actor at path; dropping message"
                );
            }
            return Ok(());
        }

        let payload = self.inner.serializer.serialize(&message)?;
        let frame = Envelope::new(path, payload).encode()?;
        self.inner.transport.send(owner, &frame).await?;
        Ok(())
    }
}

/// Transport listener that unwraps envelopes into the local actor system.
struct NodeListener<M> {
    worker_id: WorkerId,
    system: ActorSystem<M>,
    serializer: Arc<dyn Serializer<M>>,
}

impl<M: 'static> FrameListener for NodeListener<M> {
    fn on_frame(&self, payload: Vec<u8>) {
        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(worker = self.worker_id, %error, "undecodable envelope; dropping");
                return;
            }
        };

        let message = match self.serializer.deserialize(&envelope.payload) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(
                    worker = self.worker_id,
                    path = %envelope.path,
                    %error,
                    "undeserializable payload; dropping"
                );
                return;
            }
        };

        if !self.system.deliver(&envelope.path, message) {
            tracing::warn!(
                worker = self.worker_id,
                path = %envelope.path,
                "message for unknown actor path; dropping"
            );
        }
    }
}
