//! Unified error type for the gateway.

use glyphmatch_catalog::CatalogError;
use glyphmatch_protocol::ProtocolError;
use glyphmatch_room::RoomError;

/// Top-level error wrapping every layer's failure modes.
///
/// The `#[from]` conversions let `?` lift sub-crate errors without
/// ceremony; nothing in the gateway maps errors by hand except when
/// turning a [`RoomError`] into a wire `Error` event.
#[derive(Debug, thiserror::Error)]
pub enum GlyphmatchError {
    /// Socket-level I/O (bind, accept).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Encoding or decoding a wire event failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Loading the theme catalogue failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A room-layer rejection.
    #[error(transparent)]
    Room(#[from] RoomError),
}
