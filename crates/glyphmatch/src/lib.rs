//! # Glyphmatch
//!
//! A small server for ephemeral, turn-based symbol-matching rooms:
//! players quick-match into themed rooms, ready up through a countdown,
//! load their boards, and race to pick the same symbol at the same time
//! — surviving disconnects and reconnects along the way.
//!
//! This crate is the gateway layer: it accepts WebSocket connections,
//! decodes [`ClientEvent`](glyphmatch_protocol::ClientEvent)s, routes
//! them through the [`RoomRegistry`](glyphmatch_room::RoomRegistry), and
//! fans [`ServerEvent`](glyphmatch_protocol::ServerEvent)s back out. All
//! game rules live in `glyphmatch-room`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use glyphmatch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GlyphmatchError> {
//!     glyphmatch::init_tracing();
//!     let server = GlyphmatchServer::builder()
//!         .bind("0.0.0.0:8080")
//!         .build()
//!         .await?;
//!     server.run().await
//! }
//! ```

mod connection;
mod error;
mod notifier;
mod server;

pub use error::GlyphmatchError;
pub use notifier::ChannelNotifier;
pub use server::{GlyphmatchServer, GlyphmatchServerBuilder};

/// Convenience re-exports for server binaries.
pub mod prelude {
    pub use crate::{
        ChannelNotifier, GlyphmatchError, GlyphmatchServer,
        GlyphmatchServerBuilder,
    };
    pub use glyphmatch_catalog::ThemeCatalog;
    pub use glyphmatch_protocol::{
        ClientEvent, ConnectionId, EndReason, PersistentId, Phase, RoomId,
        ServerEvent, Symbol,
    };
    pub use glyphmatch_room::{GameVariant, RoomSettings, StartRule};
}

/// Installs a `tracing` subscriber honoring `RUST_LOG`.
///
/// Call once at startup; a second call panics, so binaries that install
/// their own subscriber should skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
