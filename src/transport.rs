//! Byte-stream transports for the debug protocol

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{info, warn};

/// Default TCP port of the debug listener
pub const DEFAULT_PORT: u16 = 5000;

/// A byte source and sink for the debugger connection
pub trait Transport {
    /// Next received byte, or `None` when nothing is available right now.
    /// Never blocks.
    fn poll_byte(&mut self) -> Option<u8>;

    /// Send `bytes`, blocking until all of them are written
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// In-memory transport
///
/// Bytes queued with `push_incoming` are handed out by `poll_byte`; everything sent
/// is collected until `take_outgoing`.
#[derive(Debug, Default)]
pub struct Loopback {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_incoming(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }
}

impl Transport for Loopback {
    fn poll_byte(&mut self) -> Option<u8> {
        self.incoming.pop_front()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.outgoing.extend_from_slice(bytes);
        Ok(())
    }
}

/// TCP listener serving one debugger at a time
///
/// Accepting and reading are non-blocking; when the client disconnects the
/// listener goes back to waiting for the next one.
pub struct SocketListener {
    listener: TcpListener,
    client: Option<TcpStream>,
    pending: VecDeque<u8>,
}

impl SocketListener {
    /// Listen on all interfaces
    pub fn bind(port: u16) -> io::Result<Self> {
        Self::bind_addr(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    pub fn bind_addr(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "debug listener ready");

        Ok(SocketListener {
            listener,
            client: None,
            pending: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!(%peer, error = %e, "could not configure debugger connection");
                    return;
                }
                // replies are tiny; do not batch them
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(%peer, error = %e, "could not disable Nagle on debugger connection");
                }
                info!(%peer, "debugger connected");
                self.client = Some(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    fn disconnect(&mut self) {
        if self.client.take().is_some() {
            info!("debugger disconnected");
        }
        self.pending.clear();
    }

    fn fill(&mut self) {
        let Some(client) = self.client.as_mut() else {
            return;
        };

        let mut buf = [0u8; 256];
        match client.read(&mut buf) {
            Ok(0) => self.disconnect(),
            Ok(n) => self.pending.extend(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "read from debugger failed");
                self.disconnect();
            }
        }
    }
}

impl Transport for SocketListener {
    fn poll_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.pending.pop_front() {
            return Some(byte);
        }

        if self.client.is_none() {
            self.accept();
        }
        self.fill();
        self.pending.pop_front()
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(client) = self.client.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "no debugger connected"));
        };

        client.set_nonblocking(false)?;
        let written = client.write_all(bytes).and_then(|_| client.flush());
        client.set_nonblocking(true)?;

        if let Err(e) = written {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }
}
