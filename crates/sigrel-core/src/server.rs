// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//! Relay server: accepts connections, assigns peer ids, and forwards frames
//! between connections through the peer registry.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::frame::{read_frame, write_frame, Frame, FrameError};
use crate::ids::PeerId;
use crate::registry::{Outbound, PeerRegistry};
use crate::tls::acceptor_from_pem_files;

/// A bound listener, plain TCP or TLS-terminating.
pub struct Listener {
    tcp: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind to `addr`. When both `key_file` and `cert_file` are given the
    /// listener terminates TLS; when both are absent it speaks plain TCP.
    pub async fn bind(
        addr: &str,
        key_file: Option<&Path>,
        cert_file: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let acceptor = match (key_file, cert_file) {
            (Some(key), Some(cert)) => Some(acceptor_from_pem_files(key, cert)?),
            (None, None) => None,
            _ => anyhow::bail!("key and certificate files must be provided together"),
        };
        let tcp = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        Ok(Self { tcp, acceptor })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }
}

/// The relay itself. Holds the registry shared by all connections.
pub struct Server {
    config: ServerConfig,
    registry: PeerRegistry,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: PeerRegistry::new(),
        }
    }

    /// Number of peers currently registered.
    pub async fn peer_count(&self) -> usize {
        self.registry.len().await
    }

    /// Accept connections until the listener fails; returns the accept
    /// error. Each connection runs in its own task, so a bad handshake or a
    /// misbehaving peer never touches the accept loop.
    pub async fn serve(&self, listener: Listener) -> anyhow::Result<()> {
        let Listener { tcp, acceptor } = listener;
        if let Ok(addr) = tcp.local_addr() {
            tracing::info!(%addr, tls = acceptor.is_some(), "relay listening");
        }
        loop {
            let (stream, remote) = tcp.accept().await.context("accept connection")?;
            let registry = self.registry.clone();
            let queue_frames = self.config.outbound_queue_frames.max(1);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => run_connection(stream, remote, registry, queue_frames).await,
                        Err(err) => {
                            tracing::debug!(%remote, error = %err, "tls handshake failed");
                        }
                    },
                    None => run_connection(stream, remote, registry, queue_frames).await,
                }
            });
        }
    }
}

/// Drive one connection from id assignment to teardown.
async fn run_connection<S>(
    stream: S,
    remote: SocketAddr,
    registry: PeerRegistry,
    queue_frames: usize,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let peer_id = PeerId::random();
    let (mut read_half, write_half) = tokio::io::split(stream);
    let (frames_tx, frames_rx) = mpsc::channel(queue_frames);
    let cancel = CancellationToken::new();
    let outbound = Outbound::new(frames_tx, cancel.clone());

    // The queue is empty at this point, so the blocking enqueue of the
    // identity frame cannot stall.
    if !outbound.send(Frame::identity(peer_id)).await {
        return;
    }
    // The connection becomes addressable only once the identity frame is
    // queued. A replaced predecessor (same-id collision) gets closed.
    if let Some(previous) = registry.register(peer_id, outbound.clone()).await {
        previous.close();
    }
    tracing::info!(peer_id = %peer_id, %remote, "peer connected");

    let writer = tokio::spawn(write_loop(write_half, frames_rx, cancel.clone()));

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = relay_frames(&mut read_half, peer_id, &registry) => {}
    }
    cancel.cancel();

    registry.unregister(&peer_id, &outbound).await;
    drop(read_half);
    drop(outbound);
    let _ = writer.await;
    tracing::info!(peer_id = %peer_id, %remote, "peer disconnected");
}

/// Reader loop: decode frames and hand them to their recipients.
async fn relay_frames<R>(io: &mut R, sender: PeerId, registry: &PeerRegistry)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(io).await {
            Ok(frame) => frame,
            Err(FrameError::Closed) => {
                tracing::debug!(peer_id = %sender, "peer closed connection");
                return;
            }
            Err(err) => {
                tracing::debug!(peer_id = %sender, error = %err, "closing connection after read failure");
                return;
            }
        };

        if frame.is_keepalive() {
            continue;
        }

        let Some(recipient) = registry.lookup(&frame.address).await else {
            // No response channel in the protocol; the sender may simply be
            // addressing a peer that just went away.
            tracing::trace!(recipient = %frame.address, "dropping frame for unknown peer");
            continue;
        };

        // Address rewrite: the recipient must see who the frame came from,
        // or it has no way to reply.
        let relayed = Frame::new(sender, frame.body);
        if !recipient.offer(relayed) {
            tracing::warn!(
                recipient = %frame.address,
                "outbound queue full, disconnecting unresponsive peer"
            );
            recipient.close();
        }
    }
}

/// Writer loop: sole consumer of the outbound queue, sole writer of the
/// socket. Cancellation aborts an in-flight write so a jammed socket cannot
/// pin the task.
async fn write_loop<W>(mut io: W, mut frames: mpsc::Receiver<Frame>, cancel: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    let drained = tokio::select! {
        _ = cancel.cancelled() => false,
        result = drain_frames(&mut io, &mut frames) => {
            if let Err(err) = result {
                tracing::debug!(error = %err, "closing connection after write failure");
                false
            } else {
                true
            }
        }
    };
    if drained {
        let _ = io.shutdown().await;
    }
    cancel.cancel();
}

async fn drain_frames<W>(io: &mut W, frames: &mut mpsc::Receiver<Frame>) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        write_frame(io, &frame).await?;
    }
    Ok(())
}
