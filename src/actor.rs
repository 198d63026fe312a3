//! Minimal per-worker actor system.
//!
//! Each worker hosts one [`ActorSystem`]: a registry of actors addressed by
//! path, each with a private unbounded mailbox drained by its own local
//! task. Mailbox channels are the synchronizing boundary between the many
//! transport read-loop tasks that deliver messages and the single task that
//! processes them, so actors see messages strictly one at a time.
//!
//! The system runs on the worker's cooperative scheduler and must live
//! inside a tokio `LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::error::ClusterError;

/// A unit of computation processing messages from a private mailbox.
pub trait Actor<M>: 'static {
    /// Handle one message. Invoked sequentially per actor.
    fn receive(&mut self, message: M);
}

/// Factory producing actor instances for `spawn`.
pub struct Props<M> {
    factory: Box<dyn Fn() -> Box<dyn Actor<M>>>,
}

impl<M: 'static> Props<M> {
    /// Wrap a constructor closure.
    pub fn new<A, F>(factory: F) -> Self
    where
        A: Actor<M>,
        F: Fn() -> A + 'static,
    {
        Self {
            factory: Box::new(move || Box::new(factory())),
        }
    }

    fn create(&self) -> Box<dyn Actor<M>> {
        (self.factory)()
    }
}

/// Cluster-wide shutdown trigger.
///
/// Cloneable and shareable across worker threads; `trigger` is the single
/// way a running cluster stops.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every waiter on every worker.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Suspend until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }
}

/// Per-worker actor registry and mailbox scheduler.
pub struct ActorSystem<M> {
    inner: Rc<SystemInner<M>>,
}

impl<M> Clone for ActorSystem<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct SystemInner<M> {
    name: String,
    mailboxes: RefCell<HashMap<String, mpsc::UnboundedSender<M>>>,
    shutdown: ShutdownSignal,
}

impl<M: 'static> ActorSystem<M> {
    /// Create a system named `name`, stopping when `shutdown` fires.
    pub fn new(name: impl Into<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            inner: Rc::new(SystemInner {
                name: name.into(),
                mailboxes: RefCell::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    /// System name, used for logging.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mount a new actor at `path` and start draining its mailbox.
    pub fn spawn(&self, props: Props<M>, path: &str) -> Result<(), ClusterError> {
        if path.is_empty() {
            return Err(crate::error::EnvelopeError::EmptyPath.into());
        }

        let mut mailboxes = self.inner.mailboxes.borrow_mut();
        if mailboxes.contains_key(path) {
            return Err(ClusterError::ActorExists(path.to_string()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut actor = props.create();
        let actor_path = path.to_string();
        tokio::task::spawn_local(async move {
            while let Some(message) = rx.recv().await {
                actor.receive(message);
            }
            tracing::trace!(path = %actor_path, "actor mailbox closed");
        });
        mailboxes.insert(path.to_string(), tx);

        tracing::debug!(system = %self.inner.name, path, "spawned actor");
        Ok(())
    }

    /// Enqueue `message` into the mailbox at `path`.
    ///
    /// Returns false when no actor is mounted there.
    pub fn deliver(&self, path: &str, message: M) -> bool {
        let sender = self.inner.mailboxes.borrow().get(path).cloned();
        match sender {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Whether an actor is mounted at `path`.
    pub fn has_actor(&self, path: &str) -> bool {
        self.inner.mailboxes.borrow().contains_key(path)
    }

    /// Unmount the actor at `path`. Its task drains remaining messages and
    /// exits. Returns false when no actor was mounted there.
    pub fn stop(&self, path: &str) -> bool {
        self.inner.mailboxes.borrow_mut().remove(path).is_some()
    }

    /// Run until the cluster shutdown signal fires, then unmount every
    /// actor so mailbox tasks drain and finish.
    pub async fn run(&self) {
        self.inner.shutdown.wait().await;
        tracing::debug!(system = %self.inner.name, "actor system stopping");
        self.inner.mailboxes.borrow_mut().clear();
    }

    /// The shutdown signal this system observes.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.inner.shutdown
    }
}
