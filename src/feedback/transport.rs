use std::{
    io::ErrorKind,
    net::{TcpStream, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use tungstenite::{Message, WebSocket, http::Uri};

use crate::error::SessionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(15);
/// Outbound payloads waiting for the socket; further sends are dropped.
pub const OUTBOUND_CAPACITY: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Text(String),
    Disconnected(Option<String>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    Dropped,
}

/// A streaming text connection. Connection progress and inbound messages are
/// reported through `try_next` in the order they happened.
pub trait Transport: Send {
    fn connect(&mut self, url: &str) -> Result<(), SessionError>;
    fn send_text(&mut self, payload: String) -> SendOutcome;
    /// Idempotent and never blocks; a connection that is still being
    /// established is abandoned.
    fn disconnect(&mut self);
    fn try_next(&mut self) -> Option<TransportEvent>;
}

/// Handle to a connection worker. The worker is detached: it may still be
/// resolving or handshaking, so dropping the link only raises the stop flag and
/// the worker closes its own socket once it notices.
struct WsLink {
    outbound: Sender<String>,
    inbound: Receiver<TransportEvent>,
    stop: Arc<AtomicBool>,
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Plain `ws://` client driven from a worker thread.
#[derive(Default)]
pub struct WsTransport {
    link: Option<WsLink>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn parse_endpoint(url: &str) -> Result<(String, u16), SessionError> {
    let uri: Uri = url
        .parse()
        .map_err(|_| SessionError::InvalidEndpoint(url.to_string()))?;
    if uri.scheme_str() != Some("ws") {
        return Err(SessionError::InvalidEndpoint(url.to_string()));
    }
    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SessionError::InvalidEndpoint(url.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    Ok((host, uri.port_u16().unwrap_or(80)))
}

fn dial(url: &str, host: &str, port: u16) -> anyhow::Result<WebSocket<TcpStream>> {
    let addrs = (host, port).to_socket_addrs()?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
                stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
                stream.set_nodelay(true)?;
                let (socket, _response) = tungstenite::client(url, stream)
                    .map_err(|err| anyhow::anyhow!("websocket handshake failed: {err}"))?;
                socket.get_ref().set_read_timeout(Some(POLL_INTERVAL))?;
                return Ok(socket);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(match last_err {
        Some(err) => err.into(),
        None => anyhow::anyhow!("{host}:{port} did not resolve"),
    })
}

fn run_link(
    url: String,
    host: String,
    port: u16,
    outbound: Receiver<String>,
    inbound: Sender<TransportEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut socket = match dial(&url, &host, port) {
        Ok(socket) => socket,
        Err(err) => {
            log::warn!("feedback channel to {url} failed: {err:#}");
            let _ = inbound.send(TransportEvent::Disconnected(Some(format!("{err:#}"))));
            return;
        }
    };
    if stop.load(Ordering::SeqCst) {
        let _ = socket.close(None);
        let _ = socket.flush();
        log::debug!("feedback channel to {url} abandoned during connect");
        return;
    }
    log::info!("feedback channel connected to {url}");
    let _ = inbound.send(TransportEvent::Connected);

    let reason = loop {
        if stop.load(Ordering::SeqCst) {
            let _ = socket.close(None);
            let _ = socket.flush();
            break None;
        }

        while let Ok(payload) = outbound.try_recv() {
            if let Err(err) = socket.send(Message::Text(payload)) {
                log::warn!("failed to send frame snapshot: {err}");
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                let _ = inbound.send(TransportEvent::Text(text));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                break None;
            }
            Err(err) => break Some(err.to_string()),
        }
    };

    match &reason {
        Some(err) => log::warn!("feedback channel to {url} dropped: {err}"),
        None => log::info!("feedback channel to {url} closed"),
    }
    let _ = inbound.send(TransportEvent::Disconnected(reason));
}

impl Transport for WsTransport {
    fn connect(&mut self, url: &str) -> Result<(), SessionError> {
        self.disconnect();
        let (host, port) = parse_endpoint(url)?;

        let (outbound_tx, outbound_rx) = bounded(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let url = url.to_string();

        thread::Builder::new()
            .name("feedback-channel".to_string())
            .spawn(move || run_link(url, host, port, outbound_rx, inbound_tx, stop_flag))
            .map_err(|err| SessionError::Channel(err.to_string()))?;

        self.link = Some(WsLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
            stop,
        });
        Ok(())
    }

    fn send_text(&mut self, payload: String) -> SendOutcome {
        let Some(link) = &self.link else {
            return SendOutcome::Dropped;
        };
        match link.outbound.try_send(payload) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => SendOutcome::Dropped,
        }
    }

    fn disconnect(&mut self) {
        if self.link.take().is_some() {
            log::debug!("feedback channel worker told to stop");
        }
    }

    fn try_next(&mut self) -> Option<TransportEvent> {
        self.link.as_ref()?.inbound.try_recv().ok()
    }
}
