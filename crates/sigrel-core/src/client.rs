//! Client session: dial, id acquisition, addressed send/receive,
//! keep-alives. TLS composes externally by wrapping the dialer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

use crate::config::ReconnectPolicy;
use crate::frame::{read_frame, write_frame, Frame, Message};
use crate::ids::PeerId;
use crate::tls::pinned_connector;

pub trait AsyncIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> AsyncIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn AsyncIo>;

/// Produces connected bidirectional byte streams. The client takes a dialer
/// rather than a host/port so TLS (or any future transport) can be layered
/// on from the outside.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> anyhow::Result<BoxedStream>;
}

/// Plain TCP dialer.
pub struct TcpDialer {
    pub addr: SocketAddr,
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> anyhow::Result<BoxedStream> {
        let stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("dial {}", self.addr))?;
        Ok(Box::new(stream) as BoxedStream)
    }
}

/// Upgrades every stream dialed by `inner` to TLS, trusting exactly the
/// certificate supplied in PEM form.
pub struct SecuredDialer<D> {
    inner: D,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl<D: Dialer> SecuredDialer<D> {
    pub fn new(inner: D, cert_pem: &str, server_name: &str) -> anyhow::Result<Self> {
        let connector = pinned_connector(cert_pem)?;
        let server_name =
            ServerName::try_from(server_name.to_string()).context("invalid tls server name")?;
        Ok(Self {
            inner,
            connector,
            server_name,
        })
    }
}

#[async_trait]
impl<D: Dialer> Dialer for SecuredDialer<D> {
    async fn dial(&self) -> anyhow::Result<BoxedStream> {
        let stream = self.inner.dial().await?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .context("tls handshake")?;
        Ok(Box::new(stream) as BoxedStream)
    }
}

/// A connected relay session.
///
/// `send` and `receive` may be used concurrently from independent tasks;
/// each side is serialized internally.
pub struct Client {
    id: PeerId,
    reader: Mutex<ReadHalf<BoxedStream>>,
    writer: Mutex<WriteHalf<BoxedStream>>,
    closed: AtomicBool,
}

impl Client {
    /// Dial the relay and read the identity frame. The whole attempt is
    /// retried up to `policy.attempts` times with doubling backoff.
    pub async fn connect(dialer: &dyn Dialer, policy: &ReconnectPolicy) -> anyhow::Result<Client> {
        let mut attempt = 0;
        loop {
            match Self::try_connect(dialer).await {
                Ok(client) => return Ok(client),
                Err(err) if attempt < policy.attempts => {
                    tracing::debug!(attempt, error = %err, "connect failed, retrying");
                    tokio::time::sleep(policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "connect failed after {} attempt(s)",
                        attempt + 1
                    )));
                }
            }
        }
    }

    async fn try_connect(dialer: &dyn Dialer) -> anyhow::Result<Client> {
        let mut stream = dialer.dial().await?;
        let identity = read_frame(&mut stream)
            .await
            .context("read identity frame")?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Client {
            id: identity.address,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        })
    }

    /// The id the server assigned to this session.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Send `body` to the peer identified by `recipient`. An oversize body
    /// is rejected without disturbing the connection.
    pub async fn send(&self, recipient: PeerId, body: &[u8]) -> anyhow::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("client is closed");
        }
        let frame = Frame::new(recipient, body.to_vec());
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame).await?;
        Ok(())
    }

    /// Emit a keep-alive frame. The server accepts and discards it; its only
    /// purpose is to defeat idle-connection reaping by middleboxes.
    pub async fn send_keep_alive(&self) -> anyhow::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("client is closed");
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &Frame::keepalive()).await?;
        Ok(())
    }

    /// Receive the next relayed message. The identity frame is consumed by
    /// [`Client::connect`] and never surfaced here.
    pub async fn receive(&self) -> anyhow::Result<Message> {
        let mut reader = self.reader.lock().await;
        let frame = read_frame(&mut *reader).await.context("receive frame")?;
        Ok(Message {
            from: frame.address,
            body: frame.body,
        })
    }

    /// Close the session. Idempotent; subsequent sends fail fast.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
