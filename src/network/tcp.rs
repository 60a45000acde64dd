// TCP transport driven by a worker thread
// The worker owns the socket, writes outbound frames, and reconnects on loss.
// A reader thread per connection turns inbound lines into transport events.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::NetworkSettings;
use crate::error::{NetError, NetResult};

use super::message::NetworkMessage;
use super::protocol::WireFrame;
use super::transport::{Transport, TransportEvent};

/// Reconnection behaviour of the worker
#[derive(Debug, Clone)]
pub struct TcpWorkerConfig {
    /// Delay between reconnection attempts
    pub reconnect_interval: Duration,

    /// Maximum reconnection attempts (0 = infinite)
    pub max_reconnect_attempts: u32,

    /// Enable automatic reconnection
    pub auto_reconnect: bool,

    /// Timeout of a single connection attempt
    pub connect_timeout: Duration,
}

impl From<&NetworkSettings> for TcpWorkerConfig {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            reconnect_interval: Duration::from_millis(settings.reconnect_interval_ms),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            auto_reconnect: settings.auto_reconnect,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms.max(1)),
        }
    }
}

impl Default for TcpWorkerConfig {
    fn default() -> Self {
        Self::from(&NetworkSettings::default())
    }
}

/// Requests sent TO the worker
#[derive(Debug)]
enum WorkerRequest {
    /// Write an encoded frame
    Send(Vec<u8>),

    /// Reader of the given session hit EOF or an error
    ReaderLost { session: u64, reason: String },

    /// Close the connection and stop the worker
    Close,
}

/// Handle to one running worker
/// Not Clone: the event receiver must have exactly one consumer.
struct WorkerHandle {
    request_tx: Sender<WorkerRequest>,
    event_rx: Receiver<TransportEvent>,
}

/// Newline-delimited JSON over TCP.
pub struct TcpTransport {
    config: TcpWorkerConfig,
    connected: Arc<AtomicBool>,
    worker: Option<WorkerHandle>,
}

impl TcpTransport {
    pub fn new(config: TcpWorkerConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn from_settings(settings: &NetworkSettings) -> Self {
        Self::new(TcpWorkerConfig::from(settings))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn shutdown_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.request_tx.send(WorkerRequest::Close);
        }
        self.connected.store(false, Ordering::Release);
    }
}

impl Transport for TcpTransport {
    /// Name resolution happens on the worker; a host that does not resolve
    /// is reported as a `ConnectError` event.
    fn connect(&mut self, address: &str) -> NetResult<()> {
        let address = address.trim();
        if address.is_empty() {
            return Err(NetError::InvalidAddress(address.to_string()));
        }

        self.shutdown_worker();

        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (event_tx, event_rx) = unbounded::<TransportEvent>();

        let worker = Worker {
            address: address.to_string(),
            config: self.config.clone(),
            connected: Arc::clone(&self.connected),
            request_tx: request_tx.clone(),
            request_rx,
            event_tx,
        };

        thread::Builder::new()
            .name("prism-net".to_string())
            .spawn(move || worker.run())?;

        self.worker = Some(WorkerHandle {
            request_tx,
            event_rx,
        });
        Ok(())
    }

    fn send(&mut self, message: &NetworkMessage) -> NetResult<()> {
        let worker = self.worker.as_ref().ok_or(NetError::NotConnected)?;
        if !self.is_connected() {
            return Err(NetError::NotConnected);
        }

        let bytes = WireFrame::from_message(message).encode()?;
        worker
            .request_tx
            .send(WorkerRequest::Send(bytes))
            .map_err(|_| NetError::Closed)
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.worker.as_ref()?.event_rx.try_recv().ok()
    }

    fn close(&mut self) {
        self.shutdown_worker();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

enum SessionEnd {
    Closed,
    Lost(String),
}

struct Worker {
    address: String,
    config: TcpWorkerConfig,
    connected: Arc<AtomicBool>,
    request_tx: Sender<WorkerRequest>,
    request_rx: Receiver<WorkerRequest>,
    event_tx: Sender<TransportEvent>,
}

impl Worker {
    fn run(self) {
        let mut session: u64 = 0;
        let mut attempt: u32 = 0;
        let mut ever_connected = false;

        loop {
            match self.open_stream() {
                Ok(stream) => {
                    session += 1;
                    attempt = 0;
                    ever_connected = true;

                    match self.serve(stream, session) {
                        SessionEnd::Closed => {
                            self.emit(TransportEvent::Disconnected("closed by client".to_string()));
                            return;
                        }
                        SessionEnd::Lost(reason) => {
                            warn!(reason = %reason, "Connection lost");
                            self.emit(TransportEvent::Disconnected(reason));
                        }
                    }
                }
                Err(err) => {
                    if !ever_connected && attempt == 0 {
                        self.emit(TransportEvent::ConnectError(err.to_string()));
                    } else {
                        debug_log!("Reconnect attempt {} failed: {}", attempt, err);
                    }
                }
            }

            if !self.config.auto_reconnect {
                return;
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0 && attempt > self.config.max_reconnect_attempts {
                warn!(attempts = attempt - 1, "Giving up reconnecting");
                return;
            }

            self.emit(TransportEvent::Reconnecting { attempt });
            if !self.wait_before_retry() {
                return;
            }
        }
    }

    /// Resolve the address and try each candidate in turn
    fn open_stream(&self) -> io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self.address.to_socket_addrs()?.collect();
        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} resolved to no addresses", self.address),
        );
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.config.connect_timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }

    /// Run one connected session until it is closed or lost
    fn serve(&self, mut stream: TcpStream, session: u64) -> SessionEnd {
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(err) => return SessionEnd::Lost(err.to_string()),
        };
        let event_tx = self.event_tx.clone();
        let request_tx = self.request_tx.clone();
        let spawned = thread::Builder::new()
            .name("prism-net-reader".to_string())
            .spawn(move || read_frames(reader, session, event_tx, request_tx));
        if let Err(err) = spawned {
            return SessionEnd::Lost(err.to_string());
        }

        info!(peer = ?stream.peer_addr().ok(), "Connected");
        self.connected.store(true, Ordering::Release);
        self.emit(TransportEvent::Connected);

        let end = loop {
            match self.request_rx.recv() {
                Ok(WorkerRequest::Send(bytes)) => {
                    if let Err(err) = stream.write_all(&bytes).and_then(|_| stream.flush()) {
                        break SessionEnd::Lost(err.to_string());
                    }
                }
                Ok(WorkerRequest::ReaderLost { session: lost, reason }) if lost == session => {
                    break SessionEnd::Lost(reason);
                }
                Ok(WorkerRequest::ReaderLost { .. }) => {}
                Ok(WorkerRequest::Close) | Err(_) => break SessionEnd::Closed,
            }
        };

        self.connected.store(false, Ordering::Release);
        let _ = stream.shutdown(Shutdown::Both);
        end
    }

    /// Sleep for the reconnect interval; false when asked to close meanwhile
    fn wait_before_retry(&self) -> bool {
        let deadline = Instant::now() + self.config.reconnect_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match self.request_rx.recv_timeout(remaining) {
                Ok(WorkerRequest::Close) | Err(RecvTimeoutError::Disconnected) => return false,
                Ok(WorkerRequest::Send(_)) => {
                    debug_log!("Dropping outbound frame while reconnecting");
                }
                Ok(WorkerRequest::ReaderLost { .. }) => {}
                Err(RecvTimeoutError::Timeout) => return true,
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn read_frames(
    stream: TcpStream,
    session: u64,
    event_tx: Sender<TransportEvent>,
    request_tx: Sender<WorkerRequest>,
) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match WireFrame::decode(&line) {
                Ok(frame) => {
                    let _ = event_tx.send(TransportEvent::Message {
                        verb: frame.verb,
                        data: frame.data,
                    });
                }
                Err(err) => warn!(error = %err, "Dropping malformed frame"),
            },
            Err(err) => {
                let _ = request_tx.send(WorkerRequest::ReaderLost {
                    session,
                    reason: err.to_string(),
                });
                return;
            }
        }
    }

    let _ = request_tx.send(WorkerRequest::ReaderLost {
        session,
        reason: "connection closed by peer".to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;

    fn test_config(auto_reconnect: bool) -> TcpWorkerConfig {
        TcpWorkerConfig {
            reconnect_interval: Duration::from_millis(20),
            max_reconnect_attempts: 3,
            auto_reconnect,
            connect_timeout: Duration::from_millis(500),
        }
    }

    fn wait_for(transport: &mut TcpTransport, want: impl Fn(&TransportEvent) -> bool) -> TransportEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match transport.try_recv() {
                Some(event) if want(&event) => return event,
                Some(_) => {}
                None => thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("timed out waiting for transport event");
    }

    #[test]
    fn test_empty_address() {
        let mut transport = TcpTransport::new(test_config(false));
        assert!(matches!(transport.connect("  "), Err(NetError::InvalidAddress(_))));
    }

    #[test]
    fn test_unresolvable_address_is_connect_error() {
        let mut transport = TcpTransport::new(test_config(false));
        transport
            .connect("definitely not an address")
            .expect("resolution is deferred to the worker");

        let event = wait_for(&mut transport, |event| {
            matches!(event, TransportEvent::ConnectError(_))
        });
        assert!(matches!(event, TransportEvent::ConnectError(_)));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_send_before_connect() {
        let mut transport = TcpTransport::new(test_config(false));
        let msg = NetworkMessage::new("ping", json!(null));
        assert!(matches!(transport.send(&msg), Err(NetError::NotConnected)));
    }

    #[test]
    fn test_exchange_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut transport = TcpTransport::new(test_config(false));
        transport.connect(&addr.to_string()).expect("connect");

        let (mut server, _) = listener.accept().expect("accept");
        wait_for(&mut transport, |event| *event == TransportEvent::Connected);
        assert!(transport.is_connected());

        server
            .write_all(b"{\"verb\":\"chat\",\"data\":{\"text\":\"hello\"}}\n")
            .expect("write");
        let event = wait_for(&mut transport, |event| matches!(event, TransportEvent::Message { .. }));
        assert_eq!(
            event,
            TransportEvent::Message {
                verb: "chat".to_string(),
                data: json!({"text": "hello"})
            }
        );

        transport
            .send(&NetworkMessage::new("move", json!([1, 2])))
            .expect("send");
        let mut line = String::new();
        BufReader::new(server.try_clone().expect("clone"))
            .read_line(&mut line)
            .expect("read");
        let frame = WireFrame::decode(&line).expect("decode");
        assert_eq!(frame.verb, "move");
        assert_eq!(frame.data, json!([1, 2]));

        transport.close();
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_connect_error_reported() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr")
        };

        let mut transport = TcpTransport::new(test_config(false));
        transport.connect(&addr.to_string()).expect("connect");

        let event = wait_for(&mut transport, |event| {
            matches!(event, TransportEvent::ConnectError(_))
        });
        assert!(matches!(event, TransportEvent::ConnectError(_)));
    }

    #[test]
    fn test_reconnects_after_peer_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut transport = TcpTransport::new(test_config(true));
        transport.connect(&addr.to_string()).expect("connect");

        let (server, _) = listener.accept().expect("accept");
        wait_for(&mut transport, |event| *event == TransportEvent::Connected);

        drop(server);
        wait_for(&mut transport, |event| matches!(event, TransportEvent::Disconnected(_)));
        wait_for(&mut transport, |event| {
            *event == TransportEvent::Reconnecting { attempt: 1 }
        });

        let (_server, _) = listener.accept().expect("accept again");
        wait_for(&mut transport, |event| *event == TransportEvent::Connected);
        assert!(transport.is_connected());
    }
}
