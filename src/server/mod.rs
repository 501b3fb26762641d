// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Server module - TCP listener for device sessions

mod session;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::core::ServerCore;
use crate::protocol::CidRules;
use crate::relay::RelayHandle;
use session::SessionContext;

/// Device listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on
    pub bind_address: String,

    /// Listen port
    pub port: u16,

    /// Longest byte run accepted while looking for a frame delimiter
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 20005,
            max_frame_len: 1024,
        }
    }
}

impl ServerConfig {
    /// Listener as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Accepts device connections and runs one task per session
pub struct DeviceServer {
    listener: TcpListener,
    context: Arc<SessionContext>,
}

impl DeviceServer {
    /// Bind the listener. `relay` is `None` when frames are acknowledged locally.
    pub async fn bind(
        config: &ServerConfig,
        rules: CidRules,
        core: Arc<ServerCore>,
        relay: Option<RelayHandle>,
    ) -> Result<Self> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind device listener on {}", addr))?;

        info!("Device server listening on {}", listener.local_addr()?);
        if relay.is_none() {
            info!("Relay disabled, frames are acknowledged locally");
        }

        Ok(Self {
            listener,
            context: Arc::new(SessionContext {
                core,
                relay,
                rules,
                max_frame_len: config.max_frame_len.max(1),
            }),
        })
    }

    /// Bound address; useful after binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept sessions until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            info!("Accepted connection from {}", addr);
                            let context = self.context.clone();
                            let session_shutdown = shutdown.resubscribe();
                            tokio::spawn(session::handle_session(stream, addr, context, session_shutdown));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Device server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
