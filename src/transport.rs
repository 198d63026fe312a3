//! Full-mesh Unix-domain-socket transport.
//!
//! Each worker binds one listening socket at `{socket_dir}/worker-{id}.sock`
//! and client-connects to every peer's socket, producing a full mesh of
//! unidirectional streams: a worker sends to peer `j` on its outbound
//! connection to `j` and receives on whatever connections peers opened to
//! it. Frames are length-prefixed (see [`crate::wire`]); a per-connection
//! read loop reassembles them and hands payloads, in arrival order, to the
//! installed [`FrameListener`].
//!
//! The transport never reconnects. On this single-host mesh a lost socket
//! means the peer is gone, and recovery is a cluster restart.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::TransportError;
use crate::wire::{self, FrameBuffer, READ_CHUNK_SIZE};
use crate::WorkerId;

/// How long `accept` waits before re-checking the closed flag.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a read loop waits for bytes before re-checking the closed flag.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Sink for reassembled frame payloads.
///
/// Installed once, before user code runs. Invocations from different
/// connections interleave in no particular order; frames from one
/// connection arrive in the order they were sent.
pub trait FrameListener {
    /// Handle one frame payload.
    fn on_frame(&self, payload: Vec<u8>);
}

/// Framed IPC endpoint for one worker of the mesh.
///
/// Cheap to clone; clones share the same connection table and listener.
/// Must run inside a tokio `LocalSet`: accept and read loops are spawned as
/// local tasks on the worker's cooperative scheduler.
#[derive(Clone)]
pub struct MeshTransport {
    shared: Rc<TransportShared>,
}

struct TransportShared {
    worker_id: WorkerId,
    worker_count: u32,
    socket_dir: PathBuf,
    closed: Cell<bool>,
    connections: RefCell<HashMap<WorkerId, Rc<Mutex<UnixStream>>>>,
    listener: RefCell<Option<Rc<dyn FrameListener>>>,
}

impl MeshTransport {
    /// Create the transport for `worker_id` of a `worker_count`-worker mesh
    /// rooted at `socket_dir`. No sockets are touched until [`bind`].
    ///
    /// [`bind`]: MeshTransport::bind
    pub fn new(worker_id: WorkerId, worker_count: u32, socket_dir: PathBuf) -> Self {
        Self {
            shared: Rc::new(TransportShared {
                worker_id,
                worker_count,
                socket_dir,
                closed: Cell::new(false),
                connections: RefCell::new(HashMap::new()),
                listener: RefCell::new(None),
            }),
        }
    }

    /// This worker's id in the mesh.
    pub fn worker_id(&self) -> WorkerId {
        self.shared.worker_id
    }

    /// Path of worker `id`'s listening socket.
    pub fn socket_path(&self, id: WorkerId) -> PathBuf {
        socket_path(&self.shared.socket_dir, id)
    }

    /// Install the frame sink. Replaces any previous listener.
    pub fn set_listener(&self, listener: Rc<dyn FrameListener>) {
        *self.shared.listener.borrow_mut() = Some(listener);
    }

    /// Bind this worker's listening socket and start the accept loop.
    ///
    /// Any stale socket file at the path is unlinked first.
    pub fn bind(&self) -> Result<(), TransportError> {
        let path = self.socket_path(self.shared.worker_id);
        let _ = std::fs::remove_file(&path);

        let listener = UnixListener::bind(&path).map_err(|source| TransportError::Bind {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(worker = self.shared.worker_id, path = %path.display(), "bound worker socket");

        tokio::task::spawn_local(accept_loop(listener, Rc::clone(&self.shared)));
        Ok(())
    }

    /// Open an outbound connection to every peer.
    ///
    /// Every peer must already be bound; a refused connection is fatal to
    /// this worker. After this returns the connection table covers all
    /// peers and stays fixed until [`close`].
    ///
    /// [`close`]: MeshTransport::close
    pub async fn connect_to_peers(&self) -> Result<(), TransportError> {
        for peer in 0..self.shared.worker_count {
            if peer == self.shared.worker_id {
                continue;
            }
            let path = self.socket_path(peer);
            let stream =
                UnixStream::connect(&path)
                    .await
                    .map_err(|source| TransportError::Connect {
                        peer,
                        path: path.clone(),
                        source,
                    })?;
            self.shared
                .connections
                .borrow_mut()
                .insert(peer, Rc::new(Mutex::new(stream)));
            tracing::trace!(worker = self.shared.worker_id, peer, "connected to peer");
        }
        Ok(())
    }

    /// Send one frame carrying `payload` to `target`.
    ///
    /// The whole frame is written before any other frame to the same peer
    /// can start, so frames never interleave on the wire. A missing
    /// connection (before `connect_to_peers`, after `close`, or after the
    /// peer's socket broke) drops the frame with a log line rather than
    /// failing: peer loss is local and non-fatal. A broken socket is
    /// removed from the table so later sends take the drop path.
    pub async fn send(&self, target: WorkerId, payload: &[u8]) -> Result<(), TransportError> {
        let frame = wire::encode_frame(payload)?;

        let connection = self.shared.connections.borrow().get(&target).cloned();
        let Some(connection) = connection else {
            tracing::warn!(
                worker = self.shared.worker_id,
                peer = target,
                len = payload.len(),
                "no outbound connection; dropping frame"
            );
            return Ok(());
        };

        let mut stream = connection.lock().await;
        if let Err(error) = stream.write_all(&frame).await {
            tracing::warn!(
                worker = self.shared.worker_id,
                peer = target,
                %error,
                "write to peer failed; dropping connection"
            );
            drop(stream);
            self.shared.connections.borrow_mut().remove(&target);
        }
        Ok(())
    }

    /// Shut the transport down.
    ///
    /// Sets the closed flag (accept and read loops exit within one timeout
    /// tick), shuts down and drops every outbound connection, drops the
    /// listener, and unlinks this worker's socket file.
    pub async fn close(&self) {
        if self.shared.closed.replace(true) {
            return;
        }

        let connections: Vec<_> = {
            let mut table = self.shared.connections.borrow_mut();
            table.drain().map(|(_, connection)| connection).collect()
        };
        for connection in connections {
            let mut stream = connection.lock().await;
            let _ = stream.shutdown().await;
        }

        self.shared.listener.borrow_mut().take();

        let path = self.socket_path(self.shared.worker_id);
        if let Err(error) = std::fs::remove_file(&path) {
            tracing::trace!(worker = self.shared.worker_id, %error, "socket file already gone");
        }
        tracing::debug!(worker = self.shared.worker_id, "transport closed");
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }
}

/// Path of worker `id`'s listening socket under `socket_dir`.
pub fn socket_path(socket_dir: &Path, id: WorkerId) -> PathBuf {
    socket_dir.join(format!("worker-{id}.sock"))
}

async fn accept_loop(listener: UnixListener, shared: Rc<TransportShared>) {
    loop {
        if shared.closed.get() {
            break;
        }
        match timeout(ACCEPT_TIMEOUT, listener.accept()).await {
            // Timeout: re-check the closed flag and keep listening.
            Err(_) => continue,
            Ok(Ok((stream, _addr))) => {
                tracing::trace!(worker = shared.worker_id, "accepted inbound connection");
                tokio::task::spawn_local(handle_connection(stream, Rc::clone(&shared)));
            }
            Ok(Err(error)) => {
                if !shared.closed.get() {
                    tracing::warn!(worker = shared.worker_id, %error, "accept failed; stopping accept loop");
                }
                break;
            }
        }
    }
    tracing::trace!(worker = shared.worker_id, "accept loop stopped");
}

/// Drive one inbound connection: read chunks, reassemble frames, feed the
/// listener. Exits on peer close, socket error, transport close, or a
/// malformed length field (no resync is attempted).
async fn handle_connection(mut stream: UnixStream, shared: Rc<TransportShared>) {
    let mut parser = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        if shared.closed.get() {
            break;
        }
        let read = match timeout(RECV_TIMEOUT, stream.read(&mut chunk)).await {
            // Timeout: any partial frame stays buffered for the next read.
            Err(_) => continue,
            Ok(Ok(0)) => {
                if !parser.is_empty() {
                    tracing::warn!(
                        worker = shared.worker_id,
                        buffered = parser.buffered_len(),
                        "peer closed mid-frame; discarding partial frame"
                    );
                }
                break;
            }
            Ok(Ok(read)) => read,
            Ok(Err(error)) => {
                tracing::debug!(worker = shared.worker_id, %error, "connection read failed");
                break;
            }
        };

        parser.extend(&chunk[..read]);
        loop {
            match parser.next_frame() {
                Ok(Some(payload)) => {
                    let listener = shared.listener.borrow().clone();
                    match listener {
                        Some(listener) => listener.on_frame(payload),
                        None => tracing::warn!(
                            worker = shared.worker_id,
                            "frame arrived before a listener was installed; dropping"
                        ),
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::error!(
                        worker = shared.worker_id,
                        %error,
                        "malformed frame; closing connection"
                    );
                    return;
                }
            }
        }
    }
    tracing::trace!(worker = shared.worker_id, "connection closed");
}
