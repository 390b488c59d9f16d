//! TCP transport: one thread reads the socket into the router and reconnects
//! when the connection drops, another drains the outbound command queue.
//!
//! The two threads share only the outbound queue, the writable half of the
//! socket and the connection status. Status listeners are called on actual
//! transitions only, with the status lock held: they must not call back
//! into the transport.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::listeners::ListenerSet;
use crate::protocol::{Command, Router};

/// How often blocked loops wake up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: ConnectionStatus);
}

impl<F> StatusListener for F
where
    F: Fn(ConnectionStatus) + Send + Sync,
{
    fn on_status(&self, status: ConnectionStatus) {
        self(status)
    }
}

struct Shared {
    config: Arc<ClientConfig>,
    status: Mutex<ConnectionStatus>,
    status_listeners: ListenerSet<dyn StatusListener>,
    /// Writable clone of the current connection.
    socket: Mutex<Option<TcpStream>>,
    outbound: Sender<Vec<u8>>,
    shutdown: AtomicBool,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn set_status(&self, new: ConnectionStatus) {
        let mut status = self.status.lock();
        if *status == new {
            return;
        }
        *status = new;
        info!("Connection status: {:?}", new);
        for listener in self.status_listeners.snapshot() {
            listener.on_status(new);
        }
    }

    fn teardown(&self) {
        if let Some(stream) = self.socket.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Sleep for `delay`, returning early on shutdown.
    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.is_shutdown() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

pub struct Transport {
    shared: Arc<Shared>,
    router: Option<Router>,
    outbound_rx: Option<Receiver<Vec<u8>>>,
    handles: Vec<JoinHandle<()>>,
}

impl Transport {
    /// Prepare a transport. Nothing connects until `start`; router listeners
    /// must be registered before the router is handed over.
    pub fn new(config: Arc<ClientConfig>, router: Router) -> Result<Self> {
        config.validate()?;
        let (outbound, outbound_rx) = unbounded();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                status: Mutex::new(ConnectionStatus::Disconnected),
                status_listeners: ListenerSet::new(),
                socket: Mutex::new(None),
                outbound,
                shutdown: AtomicBool::new(false),
            }),
            router: Some(router),
            outbound_rx: Some(outbound_rx),
            handles: Vec::new(),
        })
    }

    pub fn add_status_listener(&self, listener: Arc<dyn StatusListener>) {
        self.shared.status_listeners.add(listener);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.lock()
    }

    /// Spawn the reading and writing threads.
    pub fn start(&mut self) -> Result<()> {
        let (router, outbound_rx) = match (self.router.take(), self.outbound_rx.take()) {
            (Some(router), Some(rx)) => (router, rx),
            _ => return Err(Error::Config("transport already started".into())),
        };

        let shared = Arc::clone(&self.shared);
        let reader = thread::Builder::new()
            .name("collabvis-reader".into())
            .spawn(move || read_loop(shared, router))?;
        self.handles.push(reader);

        let shared = Arc::clone(&self.shared);
        let writer = thread::Builder::new()
            .name("collabvis-writer".into())
            .spawn(move || write_loop(shared, outbound_rx))?;
        self.handles.push(writer);
        Ok(())
    }

    /// Queue a command. Commands queued while disconnected are sent once a
    /// connection is up.
    pub fn send(&self, command: &Command) -> Result<()> {
        let bytes = command.encode()?;
        self.shared
            .outbound
            .send(bytes)
            .map_err(|_| Error::Disconnected)
    }

    /// Stop both threads and close the connection.
    pub fn shutdown(&mut self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.teardown();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Transport thread panicked");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn connect(shared: &Shared) -> Option<TcpStream> {
    let address = shared.config.server.address();
    let stream = match TcpStream::connect(address.as_str()) {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Connection to {} failed: {}", address, e);
            return None;
        }
    };

    let writer = stream
        .set_read_timeout(Some(POLL_INTERVAL))
        .and_then(|_| stream.set_nodelay(true))
        .and_then(|_| stream.try_clone());
    let mut writer = match writer {
        Ok(writer) => writer,
        Err(e) => {
            error!("Could not set up the connection to {}: {}", address, e);
            return None;
        }
    };

    // Identification goes out before anything left in the outbound queue.
    if shared.config.identify_on_connect {
        let sent = Command::IdentHeadset
            .encode()
            .and_then(|bytes| Ok(writer.write_all(&bytes)?));
        if let Err(e) = sent {
            error!("Could not identify to {}: {}", address, e);
            return None;
        }
    }

    *shared.socket.lock() = Some(writer);
    shared.set_status(ConnectionStatus::Connected);
    Some(stream)
}

fn read_loop(shared: Arc<Shared>, mut router: Router) {
    let mut buf = vec![0u8; shared.config.read_buffer_size];
    let delay = shared.config.reconnect_delay();

    while !shared.is_shutdown() {
        if let Some(stream) = connect(&shared) {
            read_until_closed(&shared, &mut router, stream, &mut buf);
            router.reset();
            shared.teardown();
        }
        shared.pause(delay);
    }
    debug!("Reader stopped");
}

fn read_until_closed(shared: &Shared, router: &mut Router, mut stream: TcpStream, buf: &mut [u8]) {
    while !shared.is_shutdown() {
        match stream.read(buf) {
            Ok(0) => {
                info!("Server closed the connection");
                return;
            }
            Ok(n) => {
                if let Err(e) = router.push(&buf[..n]) {
                    warn!("Dropping the connection after a stream error: {}", e);
                    return;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                error!("Read failed: {}", e);
                return;
            }
        }
    }
}

fn write_loop(shared: Arc<Shared>, outbound: Receiver<Vec<u8>>) {
    let mut pending: Option<Vec<u8>> = None;

    while !shared.is_shutdown() {
        let bytes = match pending.take() {
            Some(bytes) => bytes,
            None => match outbound.recv_timeout(POLL_INTERVAL) {
                Ok(bytes) => bytes,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        let mut socket = shared.socket.lock();
        match socket.as_mut().map(|stream| stream.write_all(&bytes)) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!("Write failed: {}", e);
                // The reader notices the closed socket and reconnects.
                if let Some(stream) = socket.take() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
                pending = Some(bytes);
            }
            None => {
                drop(socket);
                pending = Some(bytes);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    debug!("Writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::Message;
    use std::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_loopback_exchange_and_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = Arc::new(ClientConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port,
            },
            reconnect_delay_ms: 20,
            ..ClientConfig::default()
        });

        let (msg_tx, msg_rx) = unbounded();
        let router = Router::new();
        router.add_listener(Arc::new(move |m: &Message| {
            let _ = msg_tx.send(m.clone());
        }));

        let (status_tx, status_rx) = unbounded();
        let mut transport = Transport::new(config, router).unwrap();
        transport.add_status_listener(Arc::new(move |s: ConnectionStatus| {
            let _ = status_tx.send(s);
        }));
        transport.start().unwrap();

        let (mut server, _) = listener.accept().unwrap();
        server.set_read_timeout(Some(WAIT)).unwrap();
        assert_eq!(status_rx.recv_timeout(WAIT).unwrap(), ConnectionStatus::Connected);

        // identification comes first
        assert_eq!(read_exact(&mut server, 2), vec![0, 0]);

        // server -> client, split across two writes
        server.write_all(&[0, 21, 0]).unwrap();
        server.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        server.write_all(&[0, 0, 7]).unwrap();
        match msg_rx.recv_timeout(WAIT).unwrap() {
            Message::CurrentAction(a) => assert_eq!(a.action, 7),
            other => panic!("unexpected message {:?}", other),
        }

        // client -> server
        let lock = Command::RequestSubDatasetLock {
            dataset_id: 3,
            subdataset_id: 1,
        };
        transport.send(&lock).unwrap();
        let expected = lock.encode().unwrap();
        assert_eq!(read_exact(&mut server, expected.len()), expected);

        // an unknown tag drops the connection; the client comes back
        server.write_all(&[0x7f, 0x7f]).unwrap();
        assert_eq!(status_rx.recv_timeout(WAIT).unwrap(), ConnectionStatus::Disconnected);
        let (mut server, _) = listener.accept().unwrap();
        server.set_read_timeout(Some(WAIT)).unwrap();
        assert_eq!(status_rx.recv_timeout(WAIT).unwrap(), ConnectionStatus::Connected);
        assert_eq!(read_exact(&mut server, 2), vec![0, 0]);

        transport.shutdown();
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
        assert!(matches!(transport.send(&Command::IdentHeadset), Err(Error::Disconnected)));
    }

    #[test]
    fn test_ident_precedes_commands_queued_while_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = Arc::new(ClientConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port,
            },
            reconnect_delay_ms: 20,
            ..ClientConfig::default()
        });

        let mut transport = Transport::new(config, Router::new()).unwrap();
        let lock = Command::RequestSubDatasetLock {
            dataset_id: 1,
            subdataset_id: 2,
        };
        transport.send(&lock).unwrap();
        transport.start().unwrap();

        let (mut server, _) = listener.accept().unwrap();
        server.set_read_timeout(Some(WAIT)).unwrap();
        assert_eq!(read_exact(&mut server, 2), vec![0, 0]);
        let expected = lock.encode().unwrap();
        assert_eq!(read_exact(&mut server, expected.len()), expected);
        transport.shutdown();
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let config = Arc::new(ClientConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 1,
            },
            reconnect_delay_ms: 10,
            ..ClientConfig::default()
        });
        let mut transport = Transport::new(config, Router::new()).unwrap();
        transport.start().unwrap();
        assert!(matches!(transport.start(), Err(Error::Config(_))));
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
        transport.shutdown();
    }
}
