//! # a3s-session
//!
//! Multi-tenant gateway session management for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-session` keeps a registry of concurrently authenticated messaging
//! gateway sessions, each named by the identifier its gateway assigned at
//! login. Outbound text is routed to a named channel of the right session,
//! and an asynchronous error on one session never touches another. Swap
//! gateways (Discord, in-memory, etc.) without changing application code.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_session::{MemoryGateway, SessionManager};
//!
//! # async fn example() -> a3s_session::Result<()> {
//! let manager = SessionManager::new(MemoryGateway::default());
//!
//! // Log in; resolves once the session is registered
//! let id = manager.begin_session("tok1").await?;
//!
//! let delivery = manager.send_message(&id, "general", "hi").await?;
//! println!("Delivered: {}", delivery.message_id);
//!
//! manager.end_session(&id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **GatewayConnector / GatewayClient** — the gateway capability all backends implement
//! - **SessionRegistry** — injected identifier → session table
//! - **SessionLifecycle** — login handshake and registration
//! - **ChannelDispatcher** — channel lookup, payload validation, send
//! - **SessionTeardown** — removal and disconnect
//! - **SessionManager** — high-level API with the session event stream

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod manager;
mod monitor;
pub mod registry;
pub mod session;
pub mod teardown;
pub mod types;

// Re-export core types
pub use config::{SessionConfig, DEFAULT_MAX_MESSAGE_LEN};
pub use dispatch::{validate_text, ChannelDispatcher};
pub use error::{Result, SessionError};
pub use gateway::{
    BroadcastEvents, GatewayChannel, GatewayClient, GatewayConnector, GatewayEvent,
    GatewayEvents, LoginAck,
};
pub use lifecycle::SessionLifecycle;
pub use manager::SessionManager;
pub use registry::SessionRegistry;
pub use session::SessionRecord;
pub use teardown::SessionTeardown;
pub use types::{DeliveryResult, SessionEvent, SessionInfo, SessionState};

// Re-export the in-memory gateway for convenience
pub use gateway::memory::{MemoryAccount, MemoryConfig, MemoryGateway, SentMessage};
