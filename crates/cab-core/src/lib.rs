//! Shared types and ambient infrastructure for the coding agent bridge.
//!
//! This crate carries everything the daemon and CLI agree on: the session
//! model, the canonical agent-event taxonomy, the persistence snapshot
//! layout, configuration, and process-level logging/home-directory helpers.
//! It deliberately contains no I/O loops — those live in `cab-daemon`.

pub mod config;
pub mod error;
pub mod event;
pub mod home;
pub mod logging;
pub mod session;
pub mod snapshot;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use event::{AgentEvent, ContentBlock, EventPayload, ProcessedEvent};
pub use session::{Session, SessionKind, SessionStatus, TerminalInfo};
pub use snapshot::BridgeSnapshot;
