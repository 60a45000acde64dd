// Connection layer abstraction used by the network dispatcher
// A transport reports everything that happens on the connection as
// `TransportEvent`s; the dispatcher drains them from its own control flow.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{NetError, NetResult};

use super::message::NetworkMessage;

/// Everything a connection can report back to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection (re)established
    Connected,

    /// The initial connection attempt failed
    ConnectError(String),

    /// An established connection was lost or closed
    Disconnected(String),

    /// A reconnection attempt is about to start
    Reconnecting { attempt: u32 },

    /// Inbound message
    Message { verb: String, data: Value },
}

/// Connection layer behind a `NetworkDispatcher`
///
/// Implementations never block the caller for long: `connect` may start the
/// connection in the background and report the outcome as an event.
pub trait Transport: Send {
    /// Begin connecting to `address`
    fn connect(&mut self, address: &str) -> NetResult<()>;

    /// Hand one message to the connection
    fn send(&mut self, message: &NetworkMessage) -> NetResult<()>;

    /// Next pending event, if any (non-blocking)
    fn try_recv(&mut self) -> Option<TransportEvent>;

    /// Close the connection; pending events may still be drained afterwards
    fn close(&mut self);
}

#[derive(Debug, Default)]
struct LoopbackShared {
    connected: AtomicBool,
    refuse: AtomicBool,
}

/// In-process transport paired with a `LoopbackPeer`.
///
/// Used for single-player sessions and tests: the peer plays the remote side,
/// observing what was sent and injecting inbound traffic and connection events.
pub struct LoopbackTransport {
    shared: Arc<LoopbackShared>,
    event_tx: Sender<TransportEvent>,
    event_rx: Receiver<TransportEvent>,
    outbound_tx: Sender<NetworkMessage>,
}

/// Remote end of a `LoopbackTransport`
pub struct LoopbackPeer {
    shared: Arc<LoopbackShared>,
    event_tx: Sender<TransportEvent>,
    outbound_rx: Receiver<NetworkMessage>,
}

impl LoopbackTransport {
    /// Create a connected transport/peer pair (the transport still needs `connect`)
    pub fn pair() -> (LoopbackTransport, LoopbackPeer) {
        let shared = Arc::new(LoopbackShared::default());
        let (event_tx, event_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();

        let transport = LoopbackTransport {
            shared: Arc::clone(&shared),
            event_tx: event_tx.clone(),
            event_rx,
            outbound_tx,
        };
        let peer = LoopbackPeer {
            shared,
            event_tx,
            outbound_rx,
        };

        (transport, peer)
    }
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, address: &str) -> NetResult<()> {
        if address.trim().is_empty() {
            return Err(NetError::InvalidAddress(address.to_string()));
        }

        let event = if self.shared.refuse.load(Ordering::Acquire) {
            TransportEvent::ConnectError(format!("connection to {} refused", address))
        } else {
            self.shared.connected.store(true, Ordering::Release);
            TransportEvent::Connected
        };
        let _ = self.event_tx.send(event);
        Ok(())
    }

    fn send(&mut self, message: &NetworkMessage) -> NetResult<()> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(NetError::NotConnected);
        }
        self.outbound_tx
            .send(message.clone())
            .map_err(|_| NetError::Closed)
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.event_rx.try_recv().ok()
    }

    fn close(&mut self) {
        self.shared.connected.store(false, Ordering::Release);
        while self.event_rx.try_recv().is_ok() {}
    }
}

impl LoopbackPeer {
    /// Make the next `connect` fail with a connect error
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::Release);
    }

    /// Deliver an inbound message to the transport
    pub fn deliver(&self, verb: &str, data: Value) {
        let _ = self.event_tx.send(TransportEvent::Message {
            verb: verb.to_string(),
            data,
        });
    }

    /// Drop the connection from the remote side
    pub fn disconnect(&self, reason: &str) {
        self.shared.connected.store(false, Ordering::Release);
        let _ = self.event_tx.send(TransportEvent::Disconnected(reason.to_string()));
    }

    /// Report a reconnection attempt
    pub fn reconnecting(&self, attempt: u32) {
        let _ = self.event_tx.send(TransportEvent::Reconnecting { attempt });
    }

    /// Re-establish the connection from the remote side
    pub fn reconnect(&self) {
        self.shared.connected.store(true, Ordering::Release);
        let _ = self.event_tx.send(TransportEvent::Connected);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Everything the transport has sent so far, in send order
    pub fn received(&self) -> Vec<NetworkMessage> {
        self.outbound_rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_reports_event() {
        let (mut transport, peer) = LoopbackTransport::pair();
        transport.connect("loopback").expect("connect");

        assert_eq!(transport.try_recv(), Some(TransportEvent::Connected));
        assert_eq!(transport.try_recv(), None);
        assert!(peer.is_connected());
    }

    #[test]
    fn test_refused_connection() {
        let (mut transport, peer) = LoopbackTransport::pair();
        peer.refuse_connections(true);
        transport.connect("loopback").expect("connect");

        assert!(matches!(transport.try_recv(), Some(TransportEvent::ConnectError(_))));
        assert!(!peer.is_connected());
    }

    #[test]
    fn test_empty_address_rejected() {
        let (mut transport, _peer) = LoopbackTransport::pair();
        assert!(matches!(transport.connect("  "), Err(NetError::InvalidAddress(_))));
    }

    #[test]
    fn test_send_requires_connection() {
        let (mut transport, peer) = LoopbackTransport::pair();
        let msg = NetworkMessage::new("ping", json!(null));
        assert!(matches!(transport.send(&msg), Err(NetError::NotConnected)));

        transport.connect("loopback").expect("connect");
        transport.send(&msg).expect("send");
        assert_eq!(peer.received(), vec![msg]);

        transport.close();
        assert!(!peer.is_connected());
    }

    #[test]
    fn test_close_drops_pending_events() {
        let (mut transport, peer) = LoopbackTransport::pair();
        transport.connect("loopback").expect("connect");
        peer.deliver("chat", json!("hi"));

        transport.close();

        assert_eq!(transport.try_recv(), None);
        assert!(!peer.is_connected());
    }

    #[test]
    fn test_peer_events_in_order() {
        let (mut transport, peer) = LoopbackTransport::pair();
        peer.deliver("chat", json!("hi"));
        peer.disconnect("server restart");
        peer.reconnecting(1);

        assert_eq!(
            transport.try_recv(),
            Some(TransportEvent::Message {
                verb: "chat".to_string(),
                data: json!("hi")
            })
        );
        assert_eq!(
            transport.try_recv(),
            Some(TransportEvent::Disconnected("server restart".to_string()))
        );
        assert_eq!(transport.try_recv(), Some(TransportEvent::Reconnecting { attempt: 1 }));
    }
}
