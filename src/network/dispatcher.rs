// Network dispatcher: connection state, outbound queues and inbound fan-out
// Outbound messages drain one per logic tick, priority lane first. Under
// stall or overload both lanes are dropped wholesale. Inbound messages are
// published on an internal hub, one topic per verb.

use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::NetworkSettings;
use crate::error::HubResult;
use crate::events::{EventHub, Subscriber};

use super::message::NetworkMessage;
use super::state::ConnectionState;
use super::transport::{Transport, TransportEvent};

/// How `publish_net` hands a message to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Normal lane, sent after every priority message
    #[default]
    Queued,

    /// Priority lane, drained before the normal lane
    Priority,

    /// Sent right away, bypassing both lanes
    Immediate,
}

pub struct NetworkDispatcher {
    transport: Box<dyn Transport>,
    settings: NetworkSettings,
    state: ConnectionState,
    last_error: Option<String>,
    priority_queue: VecDeque<NetworkMessage>,
    queue: VecDeque<NetworkMessage>,
    hub: EventHub,
}

impl NetworkDispatcher {
    pub fn new(transport: Box<dyn Transport>, settings: NetworkSettings) -> Self {
        Self {
            transport,
            settings,
            state: ConnectionState::WaitingForInitialization,
            last_error: None,
            priority_queue: VecDeque::new(),
            queue: VecDeque::new(),
            hub: EventHub::new(),
        }
    }

    /// Open the connection to `address`.
    ///
    /// Calling this again without `stop` is allowed but logged. The outcome
    /// of the connection attempt arrives through `poll`.
    pub fn start(&mut self, address: &str) {
        if self.state != ConnectionState::WaitingForInitialization {
            warn!(state = %self.state, "Network already initialized, starting again");
        }

        self.set_state(ConnectionState::Initializing);
        if let Err(err) = self.transport.connect(address) {
            self.record_error(err.to_string());
        }
    }

    /// Close the connection and discard everything still queued
    pub fn stop(&mut self) {
        self.transport.close();
        // Events the connection reported before closing belong to the old session
        let stale = self.discard_events();
        if stale > 0 {
            debug!(stale, "Discarded pending transport events");
        }

        let dropped = self.queued_len();
        self.priority_queue.clear();
        self.queue.clear();
        self.set_state(ConnectionState::WaitingForInitialization);

        if dropped > 0 {
            info!(dropped, "Network stopped, discarded queued messages");
        }
    }

    /// Accept `message` for sending.
    ///
    /// Returns `false` without queueing anything when not connected, or when an
    /// immediate send is rejected by the transport.
    pub fn publish_net(&mut self, message: NetworkMessage, delivery: Delivery) -> bool {
        if !self.state.is_connected() {
            debug!(verb = message.verb(), state = %self.state, "Not connected, message rejected");
            return false;
        }

        match delivery {
            Delivery::Immediate => return self.send(&message),
            Delivery::Priority => self.priority_queue.push_back(message),
            Delivery::Queued => self.queue.push_back(message),
        }
        true
    }

    /// Queue `data` under `verb` on the normal lane
    pub fn send_message(&mut self, verb: &str, data: Value) -> bool {
        self.publish_net(NetworkMessage::new(verb, data), Delivery::Queued)
    }

    /// Send at most one queued message; called once per logic tick.
    ///
    /// A tick slower than the stall limit, or a backlog above the queue limit,
    /// drops both lanes entirely instead.
    pub fn update(&mut self, delta: Duration) {
        if !self.state.is_connected() || self.queued_len() == 0 {
            return;
        }

        let delta_ms = delta.as_secs_f64() * 1000.0;
        if delta_ms > self.settings.delayed_package_drop_ms as f64 {
            warn!(
                delta_ms,
                priority = self.priority_queue.len(),
                queued = self.queue.len(),
                "Tick too slow, dropping queued messages"
            );
            self.drop_queues();
            return;
        }

        if self.queued_len() > self.settings.max_queued_messages {
            warn!(
                priority = self.priority_queue.len(),
                queued = self.queue.len(),
                limit = self.settings.max_queued_messages,
                "Too many queued messages, dropping all"
            );
            self.drop_queues();
            return;
        }

        let next = self
            .priority_queue
            .pop_front()
            .or_else(|| self.queue.pop_front());
        if let Some(message) = next {
            self.send(&message);
        }
    }

    /// Drain pending transport events: apply state changes and publish
    /// inbound messages on their verb's topic. Returns the number of events
    /// handled.
    ///
    /// A stopped dispatcher only leaves `WaitingForInitialization` through
    /// `start`, so events arriving while stopped are discarded unapplied.
    pub fn poll(&mut self) -> usize {
        if self.state == ConnectionState::WaitingForInitialization {
            self.discard_events();
            return 0;
        }

        let mut handled = 0;
        while let Some(event) = self.transport.try_recv() {
            handled += 1;
            match event {
                TransportEvent::Connected => self.set_state(ConnectionState::Connected),
                TransportEvent::ConnectError(reason) => self.record_error(reason),
                TransportEvent::Disconnected(reason) => {
                    warn!(reason = %reason, "Disconnected");
                    self.set_state(ConnectionState::Disconnected);
                }
                TransportEvent::Reconnecting { attempt } => {
                    debug_log!("Reconnect attempt {}", attempt);
                    self.set_state(ConnectionState::Reconnecting);
                }
                TransportEvent::Message { verb, data } => self.dispatch_inbound(verb, data),
            }
        }
        handled
    }

    /// Subscribe to inbound messages whose verb is `topic_name`
    pub fn subscribe_net<F>(&self, topic_name: &str, callback: F) -> HubResult<Subscriber<NetworkMessage>>
    where
        F: Fn(&NetworkMessage) + Send + Sync + 'static,
    {
        self.hub.subscribe(topic_name, callback)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Last connection error, cleared on the next successful connect
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn priority_len(&self) -> usize {
        self.priority_queue.len()
    }

    pub fn normal_len(&self) -> usize {
        self.queue.len()
    }

    /// Messages waiting in both lanes
    pub fn queued_len(&self) -> usize {
        self.priority_queue.len() + self.queue.len()
    }

    /// Internal hub carrying inbound messages
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    fn dispatch_inbound(&self, verb: String, data: Value) {
        let message = NetworkMessage::new(verb, data);
        match self.hub.advertise::<NetworkMessage>(message.verb()) {
            Ok(publisher) => {
                publisher.publish(message);
            }
            Err(err) => error!(error = %err, "Inbound message not delivered"),
        }
    }

    fn send(&mut self, message: &NetworkMessage) -> bool {
        match self.transport.send(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(verb = message.verb(), error = %err, "Failed to send message");
                false
            }
        }
    }

    fn discard_events(&mut self) -> usize {
        let mut discarded = 0;
        while self.transport.try_recv().is_some() {
            discarded += 1;
        }
        discarded
    }

    fn drop_queues(&mut self) {
        self.priority_queue.clear();
        self.queue.clear();
    }

    fn record_error(&mut self, reason: String) {
        error!(reason = %reason, "Connection error");
        self.last_error = Some(reason);
        self.set_state(ConnectionState::ConnectionError);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "Connection state changed");
        if state == ConnectionState::Connected {
            self.last_error = None;
        }
        self.state = state;
    }
}

impl std::fmt::Debug for NetworkDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDispatcher")
            .field("state", &self.state)
            .field("priority", &self.priority_queue.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::{LoopbackPeer, LoopbackTransport};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn dispatcher() -> (NetworkDispatcher, LoopbackPeer) {
        let (transport, peer) = LoopbackTransport::pair();
        let dispatcher = NetworkDispatcher::new(Box::new(transport), NetworkSettings::default());
        (dispatcher, peer)
    }

    fn connected() -> (NetworkDispatcher, LoopbackPeer) {
        let (mut dispatcher, peer) = dispatcher();
        dispatcher.start("loopback");
        dispatcher.poll();
        assert_eq!(dispatcher.state(), ConnectionState::Connected);
        (dispatcher, peer)
    }

    fn msg(verb: &str) -> NetworkMessage {
        NetworkMessage::new(verb, json!(null))
    }

    fn verbs(peer: &LoopbackPeer) -> Vec<String> {
        peer.received().iter().map(|m| m.verb().to_string()).collect()
    }

    #[test]
    fn test_publish_offline_returns_false() {
        let (mut dispatcher, peer) = dispatcher();

        assert!(!dispatcher.publish_net(msg("a"), Delivery::Queued));
        assert!(!dispatcher.publish_net(msg("b"), Delivery::Priority));
        assert!(!dispatcher.publish_net(msg("c"), Delivery::Immediate));
        assert!(!dispatcher.send_message("d", json!(1)));

        assert_eq!(dispatcher.queued_len(), 0);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_start_transitions_through_initializing() {
        let (mut dispatcher, _peer) = dispatcher();
        dispatcher.start("loopback");
        assert_eq!(dispatcher.state(), ConnectionState::Initializing);

        assert_eq!(dispatcher.poll(), 1);
        assert!(dispatcher.is_connected());
    }

    #[test]
    fn test_priority_drains_first_one_per_update() {
        let (mut dispatcher, peer) = connected();

        for verb in ["n1", "n2"] {
            assert!(dispatcher.publish_net(msg(verb), Delivery::Queued));
        }
        for verb in ["p1", "p2", "p3"] {
            assert!(dispatcher.publish_net(msg(verb), Delivery::Priority));
        }
        assert_eq!(dispatcher.priority_len(), 3);
        assert_eq!(dispatcher.normal_len(), 2);

        let tick = Duration::from_millis(33);
        dispatcher.update(tick);
        assert_eq!(verbs(&peer), vec!["p1"]);

        dispatcher.update(tick);
        dispatcher.update(tick);
        assert_eq!(verbs(&peer), vec!["p2", "p3"]);
        assert_eq!(dispatcher.priority_len(), 0);

        dispatcher.update(tick);
        dispatcher.update(tick);
        assert_eq!(verbs(&peer), vec!["n1", "n2"]);

        dispatcher.update(tick);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_slow_tick_drops_everything() {
        let (mut dispatcher, peer) = connected();
        dispatcher.publish_net(msg("p"), Delivery::Priority);
        dispatcher.publish_net(msg("n"), Delivery::Queued);

        dispatcher.update(Duration::from_millis(5001));

        assert_eq!(dispatcher.queued_len(), 0);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_stall_limit_is_exclusive() {
        let (mut dispatcher, peer) = connected();
        dispatcher.publish_net(msg("n"), Delivery::Queued);

        dispatcher.update(Duration::from_millis(5000));

        assert_eq!(verbs(&peer), vec!["n"]);
    }

    #[test]
    fn test_overload_drops_everything() {
        let (mut dispatcher, peer) = connected();
        for i in 0..60 {
            dispatcher.publish_net(msg(&format!("p{}", i)), Delivery::Priority);
        }
        for i in 0..41 {
            dispatcher.send_message(&format!("n{}", i), json!(i));
        }
        assert_eq!(dispatcher.queued_len(), 101);

        dispatcher.update(Duration::from_millis(33));

        assert_eq!(dispatcher.queued_len(), 0);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_queue_at_limit_still_sends() {
        let (mut dispatcher, peer) = connected();
        for i in 0..100 {
            dispatcher.send_message(&format!("n{}", i), json!(i));
        }

        dispatcher.update(Duration::from_millis(33));

        assert_eq!(verbs(&peer), vec!["n0"]);
        assert_eq!(dispatcher.queued_len(), 99);
    }

    #[test]
    fn test_immediate_bypasses_queues() {
        let (mut dispatcher, peer) = connected();
        dispatcher.publish_net(msg("queued"), Delivery::Priority);

        assert!(dispatcher.publish_net(msg("now"), Delivery::Immediate));

        assert_eq!(verbs(&peer), vec!["now"]);
        assert_eq!(dispatcher.priority_len(), 1);
    }

    #[test]
    fn test_stop_then_start_resets() {
        let (mut dispatcher, peer) = connected();
        dispatcher.publish_net(msg("p"), Delivery::Priority);
        dispatcher.publish_net(msg("n"), Delivery::Queued);

        dispatcher.stop();
        assert_eq!(dispatcher.state(), ConnectionState::WaitingForInitialization);
        assert_eq!(dispatcher.queued_len(), 0);
        assert!(!dispatcher.publish_net(msg("late"), Delivery::Queued));

        dispatcher.start("loopback");
        dispatcher.poll();
        assert!(dispatcher.is_connected());
        assert_eq!(dispatcher.queued_len(), 0);

        dispatcher.update(Duration::from_millis(33));
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_stop_discards_pending_events() {
        let (mut dispatcher, peer) = dispatcher();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        dispatcher
            .subscribe_net("chat", move |_| *counter.lock() += 1)
            .expect("subscribe");

        // Connected and the message are still pending when stop runs
        dispatcher.start("loopback");
        peer.deliver("chat", json!("stale"));
        dispatcher.stop();

        assert_eq!(dispatcher.poll(), 0);
        assert_eq!(dispatcher.state(), ConnectionState::WaitingForInitialization);
        assert!(!dispatcher.publish_net(msg("late"), Delivery::Queued));
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_events_while_stopped_are_ignored() {
        let (mut dispatcher, peer) = connected();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        dispatcher
            .subscribe_net("chat", move |_| *counter.lock() += 1)
            .expect("subscribe");

        dispatcher.stop();
        peer.deliver("chat", json!("while stopped"));
        peer.reconnect();

        assert_eq!(dispatcher.poll(), 0);
        assert_eq!(dispatcher.state(), ConnectionState::WaitingForInitialization);
        assert_eq!(dispatcher.queued_len(), 0);
        assert_eq!(*count.lock(), 0);

        // A fresh start only sees what arrives afterwards
        dispatcher.start("loopback");
        peer.deliver("chat", json!("after start"));
        dispatcher.poll();
        assert!(dispatcher.is_connected());
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_start_twice_is_tolerated() {
        let (mut dispatcher, _peer) = connected();
        dispatcher.start("loopback");
        dispatcher.poll();
        assert!(dispatcher.is_connected());
    }

    #[test]
    fn test_connect_error_is_recorded() {
        let (mut dispatcher, peer) = dispatcher();
        peer.refuse_connections(true);

        dispatcher.start("loopback");
        dispatcher.poll();

        assert_eq!(dispatcher.state(), ConnectionState::ConnectionError);
        assert!(dispatcher.last_error().is_some());
        assert!(!dispatcher.send_message("x", json!(null)));
    }

    #[test]
    fn test_invalid_address_is_recorded() {
        let (mut dispatcher, _peer) = dispatcher();
        dispatcher.start("");

        assert_eq!(dispatcher.state(), ConnectionState::ConnectionError);
        assert!(dispatcher.last_error().is_some());
    }

    #[test]
    fn test_disconnect_and_reconnect_states() {
        let (mut dispatcher, peer) = connected();
        dispatcher.send_message("n", json!(null));

        peer.disconnect("server restart");
        dispatcher.poll();
        assert_eq!(dispatcher.state(), ConnectionState::Disconnected);

        // Queued messages wait for the connection to come back
        dispatcher.update(Duration::from_millis(33));
        assert_eq!(dispatcher.queued_len(), 1);

        peer.reconnecting(1);
        dispatcher.poll();
        assert_eq!(dispatcher.state(), ConnectionState::Reconnecting);

        peer.reconnect();
        dispatcher.poll();
        assert!(dispatcher.is_connected());

        dispatcher.update(Duration::from_millis(33));
        assert_eq!(verbs(&peer), vec!["n"]);
    }

    #[test]
    fn test_inbound_fan_out_by_verb() {
        let (mut dispatcher, peer) = connected();
        let chats = Arc::new(Mutex::new(Vec::new()));
        let moves = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&chats);
        dispatcher
            .subscribe_net("chat", move |m| sink.lock().push(m.data().clone()))
            .expect("subscribe");
        let sink = Arc::clone(&chats);
        dispatcher
            .subscribe_net("chat", move |m| sink.lock().push(m.data().clone()))
            .expect("subscribe");
        let counter = Arc::clone(&moves);
        dispatcher
            .subscribe_net("move", move |_| *counter.lock() += 1)
            .expect("subscribe");

        peer.deliver("chat", json!("hi"));
        peer.deliver("unknownVerb", json!(1));
        assert_eq!(dispatcher.poll(), 2);

        assert_eq!(*chats.lock(), vec![json!("hi"), json!("hi")]);
        assert_eq!(*moves.lock(), 0);
        assert!(dispatcher.hub().has_topic("unknownVerb"));
    }

    #[test]
    fn test_unsubscribed_net_listener() {
        let (mut dispatcher, peer) = connected();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let sub = dispatcher
            .subscribe_net("chat", move |_| *counter.lock() += 1)
            .expect("subscribe");

        peer.deliver("chat", json!("one"));
        dispatcher.poll();
        sub.unsubscribe();
        peer.deliver("chat", json!("two"));
        dispatcher.poll();

        assert_eq!(*count.lock(), 1);
    }
}
