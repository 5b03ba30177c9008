pub mod client;
pub mod config;
pub mod frame;
pub mod ids;
pub mod registry;
pub mod server;
pub mod tls;

pub use client::{AsyncIo, BoxedStream, Client, Dialer, SecuredDialer, TcpDialer};
pub use config::{ReconnectPolicy, ServerConfig};
pub use frame::{
    encode_frame, read_frame, write_frame, Frame, FrameError, Message, FRAME_OVERHEAD,
    KEEPALIVE_BODY, MAX_BODY_BYTES,
};
pub use ids::{PeerId, PEER_ID_LENGTH};
pub use registry::{Outbound, PeerRegistry};
pub use server::{Listener, Server};
pub use tls::{acceptor_from_pem_files, generate_self_signed_pem, pinned_connector};

#[cfg(test)]
mod conformance;
