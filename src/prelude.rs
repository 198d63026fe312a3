//! Convenient re-exports for applications building on meshwork.

pub use crate::actor::{Actor, ActorSystem, Props, ShutdownSignal};
pub use crate::cluster::{Cluster, ClusterConfig};
pub use crate::directory::SharedDirectory;
pub use crate::envelope::Envelope;
pub use crate::error::{ClusterError, EnvelopeError, TransportError};
pub use crate::node::ClusterNode;
pub use crate::ring::{HashRing, DEFAULT_REPLICAS};
pub use crate::serializer::{JsonSerializer, Serializer};
pub use crate::transport::{FrameListener, MeshTransport};
pub use crate::WorkerId;
