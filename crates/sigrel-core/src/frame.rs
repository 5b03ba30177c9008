//! Wire framing for relay traffic.
//!
//! Every frame is a 16-bit little-endian length prefix (counting the bytes
//! that follow), a 16-byte peer address (two little-endian u64 words), and
//! an opaque body. Overhead is exactly 18 bytes per frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ids::{PeerId, PEER_ID_LENGTH};

/// Bytes of framing overhead per message: length prefix plus address.
pub const FRAME_OVERHEAD: usize = 2 + PEER_ID_LENGTH;

/// Largest body that fits in a frame. The length prefix counts address and
/// body together, so the body tops out at `u16::MAX - 16`.
pub const MAX_BODY_BYTES: usize = u16::MAX as usize - PEER_ID_LENGTH;

/// Keep-alive sentinel body. Sent with an all-zero address; the server
/// accepts and discards it.
pub const KEEPALIVE_BODY: &[u8] = b"k";

/// One wire unit. On frames from a client the address names the recipient;
/// on frames from the server it names the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: PeerId,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(address: PeerId, body: Vec<u8>) -> Self {
        Self { address, body }
    }

    /// The first frame the server sends on a new connection: the assigned
    /// id in the address field, empty body.
    pub fn identity(id: PeerId) -> Self {
        Self {
            address: id,
            body: Vec::new(),
        }
    }

    pub fn keepalive() -> Self {
        Self {
            address: PeerId::zero(),
            body: KEEPALIVE_BODY.to_vec(),
        }
    }

    pub fn is_keepalive(&self) -> bool {
        self.address.is_zero() && self.body == KEEPALIVE_BODY
    }
}

/// A relayed message as surfaced by the client API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Id of the peer that sent the message.
    pub from: PeerId,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Clean EOF at a frame boundary.
    #[error("stream closed")]
    Closed,
    /// The declared frame length cannot even hold the address.
    #[error("frame length {0} is shorter than the address")]
    LengthTooShort(u16),
    /// The body exceeds the protocol maximum of [`MAX_BODY_BYTES`].
    #[error("frame body of {size} bytes exceeds the {max}-byte maximum")]
    BodyTooLarge { size: usize, max: usize },
    /// The stream ended in the middle of a frame.
    #[error("stream ended mid-frame")]
    Truncated,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a frame: `le16(16 + body.len()) || address || body`.
pub fn encode_frame(address: &PeerId, body: &[u8]) -> Result<Vec<u8>, FrameError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(FrameError::BodyTooLarge {
            size: body.len(),
            max: MAX_BODY_BYTES,
        });
    }
    let length = (PEER_ID_LENGTH + body.len()) as u16;
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + body.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&address.to_wire());
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Read exactly one frame.
///
/// EOF before the first length byte is a clean close ([`FrameError::Closed`]);
/// EOF anywhere inside a frame is [`FrameError::Truncated`].
pub async fn read_frame<S>(io: &mut S) -> Result<Frame, FrameError>
where
    S: AsyncRead + Unpin,
{
    let length = match io.read_u16_le().await {
        Ok(length) => length,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Closed)
        }
        Err(err) => return Err(err.into()),
    };
    if (length as usize) < PEER_ID_LENGTH {
        return Err(FrameError::LengthTooShort(length));
    }

    let mut buf = vec![0u8; length as usize];
    io.read_exact(&mut buf).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(err)
        }
    })?;

    let mut address = [0u8; PEER_ID_LENGTH];
    address.copy_from_slice(&buf[..PEER_ID_LENGTH]);
    Ok(Frame {
        address: PeerId::from_wire(address),
        body: buf[PEER_ID_LENGTH..].to_vec(),
    })
}

/// Write one frame and flush it.
pub async fn write_frame<S>(io: &mut S, frame: &Frame) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    let encoded = encode_frame(&frame.address, &frame.body)?;
    io.write_all(&encoded).await?;
    io.flush().await?;
    Ok(())
}
