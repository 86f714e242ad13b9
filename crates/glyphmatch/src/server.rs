//! `GlyphmatchServer` builder and accept loop.

use std::sync::Arc;

use glyphmatch_catalog::ThemeCatalog;
use glyphmatch_protocol::JsonCodec;
use glyphmatch_room::{Notifier, RoomNotice, RoomRegistry, RoomSettings};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

use crate::connection::handle_connection;
use crate::{ChannelNotifier, GlyphmatchError};

/// Shared server state, cloned into every connection-handler task.
pub(crate) struct GatewayState {
    pub(crate) registry: Mutex<RoomRegistry>,
    pub(crate) notifier: Arc<ChannelNotifier>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a Glyphmatch server.
pub struct GlyphmatchServerBuilder {
    bind_addr: String,
    settings: RoomSettings,
    catalog: Option<ThemeCatalog>,
}

impl GlyphmatchServerBuilder {
    /// Creates a builder with default settings: localhost bind, built-in
    /// catalogue, default room timings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            settings: RoomSettings::default(),
            catalog: None,
        }
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Overrides the room settings.
    pub fn settings(mut self, settings: RoomSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Uses a specific theme catalogue instead of the built-in one.
    pub fn catalog(mut self, catalog: ThemeCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Binds the listener and assembles the server.
    pub async fn build(self) -> Result<GlyphmatchServer, GlyphmatchError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "gateway listening");

        let catalog =
            Arc::new(self.catalog.unwrap_or_else(ThemeCatalog::builtin));
        let notifier = Arc::new(ChannelNotifier::new());
        let (registry, notices) = RoomRegistry::new(
            catalog,
            self.settings,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );

        Ok(GlyphmatchServer {
            listener,
            notices,
            state: Arc::new(GatewayState {
                registry: Mutex::new(registry),
                notifier,
                codec: JsonCodec,
            }),
        })
    }
}

impl Default for GlyphmatchServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Glyphmatch server.
pub struct GlyphmatchServer {
    listener: TcpListener,
    notices: mpsc::UnboundedReceiver<RoomNotice>,
    state: Arc<GatewayState>,
}

impl GlyphmatchServer {
    /// Creates a new builder.
    pub fn builder() -> GlyphmatchServerBuilder {
        GlyphmatchServerBuilder::new()
    }

    /// The local address the server is bound to (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Also spawns the reaper: rooms report their own closure, and the
    /// reaper deletes them from the registry so stale handles never
    /// accumulate.
    pub async fn run(mut self) -> Result<(), GlyphmatchError> {
        tracing::info!("glyphmatch server running");

        let reaper_state = Arc::clone(&self.state);
        let mut notices = self.notices;
        tokio::spawn(async move {
            while let Some(RoomNotice::Closed { room, reason }) =
                notices.recv().await
            {
                tracing::info!(room_id = %room, %reason, "reaping closed room");
                reaper_state.registry.lock().await.delete_room(&room).await;
            }
        });

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(%addr, "inbound connection");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
