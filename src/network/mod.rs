// Networking: outbound queues, connection state and inbound fan-out

pub mod dispatcher;
pub mod message;
pub mod protocol;
pub mod state;
pub mod tcp;
pub mod transport;

pub use dispatcher::{Delivery, NetworkDispatcher};
pub use message::NetworkMessage;
pub use protocol::WireFrame;
pub use state::ConnectionState;
pub use tcp::{TcpTransport, TcpWorkerConfig};
pub use transport::{LoopbackPeer, LoopbackTransport, Transport, TransportEvent};
