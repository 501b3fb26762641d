// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! CID Relay - Contact-ID device event server
//!
//! A long-running backend that accepts TCP sessions from alarm devices,
//! decides which sessions to admit, keeps bounded per-device and global
//! event histories, and relays every accepted frame to an upstream receiver.
//! A desktop shell reads everything through the read-only [`QueryFacade`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CID Relay                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  devices ──TCP──► DeviceServer ──► ConnectionAdmitter         │
//! │                       │                 │                    │
//! │                       │                 ▼                    │
//! │                       │          DeviceRegistry ◄──┐         │
//! │                       ▼                            │         │
//! │                 DeliveryQueue ──► UpstreamClient   │         │
//! │                       │                            │         │
//! │                       └──► ServerCore::record_event┘         │
//! │                                  │                           │
//! │            per-device EventLog ◄─┴─► global EventLog         │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ QueryFacade: stats · logs · devices · events (read-only)│  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod admission;
pub mod config;
pub mod core;
pub mod devices;
pub mod logging;
pub mod protocol;
pub mod query;
pub mod relay;
pub mod server;

// Re-exports for convenience
pub use admission::{AdmitDecision, ConnectionAdmitter, RejectReason, SessionLease};
pub use config::Config;
pub use crate::core::{EventLog, ServerCore, StatsCounter};
pub use devices::{DeviceRegistry, DeviceState};
pub use logging::LogBuffer;
pub use query::QueryFacade;
pub use relay::{DeliveryQueue, RelayHandle, UpstreamClient};
pub use server::DeviceServer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Display name
pub const NAME: &str = "CID Relay";
