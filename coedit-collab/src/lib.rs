//! # coedit-collab — Websocket replication for coedit
//!
//! Connects [`coedit_core::CollaborationService`] instances through a
//! central sync server.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐     WebSocket      ┌─────────────┐
//! │ WebsocketProvider │ ◄─────────────────► │ SyncServer  │
//! │ (per service)     │     Binary Proto    │ (central)   │
//! └─────────┬─────────┘                     └──────┬──────┘
//!           │                                      │
//!           ▼                                      ▼
//! ┌───────────────────┐                     ┌─────────────┐
//! │ yrs Doc           │                     │ yrs Doc     │
//! │ (local replica)   │                     │ (per room)  │
//! └───────────────────┘                     └──────┬──────┘
//!                                                  │
//!                                   ┌──────────────┼──────────────┐
//!                                   ▼                             ▼
//!                           BroadcastGroup                ContentSource
//!                           (fan-out)                     (initial text)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded SyncMessage)
//! - [`broadcast`] — Room fan-out with backpressure
//! - [`server`] — WebSocket sync server
//! - [`client`] — Transport provider with offline queue, and content fetcher
//! - [`content`] — Where the server loads initial document text from

pub mod broadcast;
pub mod client;
pub mod content;
pub mod protocol;
pub mod server;

pub use broadcast::{BroadcastGroup, BroadcastStats, Frame, PeerEntry};
pub use client::{
    ConnectionState, OfflineQueue, Outbound, ProviderConfig, ProviderContentFetcher,
    WebsocketProvider,
};
pub use content::{ContentSource, FsContentSource, MemoryContentSource};
pub use protocol::{MessageType, ProtocolError, SyncMessage, SERVER_CLIENT_ID};
pub use server::{ServerConfig, ServerStats, SyncServer};
