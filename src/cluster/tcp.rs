//! TCP peer transport.
//!
//! Each configured peer gets a writer task with a lazily opened outbound
//! connection. A failed write drops the connection and the message; the next
//! message reconnects. Inbound connections are accepted on the bind address
//! and their frames are forwarded to a single inbound queue.

use super::protocol::{decode_frame, encode_frame, Envelope, PeerMessage};
use super::transport::{Transport, TransportError};
use anyhow::{Context, Result};
use bytes::BytesMut;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Production transport over TCP.
#[derive(Debug)]
pub struct TcpTransport {
    local: String,
    local_addr: SocketAddr,
    writers: HashMap<String, mpsc::UnboundedSender<PeerMessage>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TcpTransport {
    /// Bind the listener and spawn the accept loop and one writer per peer.
    ///
    /// `peers` maps peer names to `host:port` addresses.
    pub async fn bind(
        local: impl Into<String>,
        bind: &str,
        peers: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Envelope>)> {
        let local = local.into();
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind peer listener on {}", bind))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read peer listener address")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(accept_loop(listener, inbound_tx, shutdown_rx.clone()));

        let mut writers = HashMap::new();
        for (name, address) in peers {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(writer_loop(
                local.clone(),
                name.clone(),
                address,
                rx,
                shutdown_rx.clone(),
            ));
            writers.insert(name, tx);
        }

        tracing::info!(node = %local, addr = %local_addr, peers = writers.len(), "peer transport listening");

        Ok((
            Self {
                local,
                local_addr,
                writers,
                shutdown_tx,
            },
            inbound_rx,
        ))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for TcpTransport {
    fn local_name(&self) -> &str {
        &self.local
    }

    fn send(&self, peer: &str, message: PeerMessage) -> Result<(), TransportError> {
        if *self.shutdown_tx.borrow() {
            return Err(TransportError::Closed);
        }
        let writer = self
            .writers
            .get(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;
        writer.send(message).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    tracing::debug!(%remote, "peer connection accepted");
                    tokio::spawn(read_loop(stream, remote, inbound.clone(), shutdown.clone()));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept peer connection");
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn read_loop(
    mut stream: TcpStream,
    remote: SocketAddr,
    inbound: mpsc::UnboundedSender<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        tokio::select! {
            read = stream.read_buf(&mut buffer) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => loop {
                        match decode_frame(&mut buffer) {
                            Ok(Some(envelope)) => {
                                if inbound.send(envelope).is_err() {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                tracing::warn!(%remote, error = %err, "dropping peer connection on bad frame");
                                return;
                            }
                        }
                    },
                    Err(err) => {
                        tracing::debug!(%remote, error = %err, "peer connection read failed");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn writer_loop(
    local: String,
    peer: String,
    address: String,
    mut outbound: mpsc::UnboundedReceiver<PeerMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connection: Option<TcpStream> = None;
    let mut buffer = BytesMut::new();

    loop {
        let message = tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        buffer.clear();
        let envelope = Envelope::new(local.clone(), message);
        if let Err(err) = encode_frame(&envelope, &mut buffer) {
            tracing::warn!(peer = %peer, error = %err, "failed to encode peer message");
            continue;
        }

        if connection.is_none() {
            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(peer = %peer, address = %address, "connected to peer");
                    connection = Some(stream);
                }
                Err(err) => {
                    tracing::debug!(peer = %peer, address = %address, error = %err, "peer unreachable, message dropped");
                    continue;
                }
            }
        }

        if let Some(stream) = connection.as_mut() {
            if let Err(err) = stream.write_all(&buffer).await {
                tracing::debug!(peer = %peer, error = %err, "peer write failed, message dropped");
                connection = None;
            }
        }
    }
}
