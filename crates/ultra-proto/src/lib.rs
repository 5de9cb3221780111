//! # ultra-proto
//!
//! Protocol layer for the Ultra IRC gateway.
//!
//! ## Features
//!
//! - Tagged-union event envelopes for the session-multiplexed transport
//! - Message records, scopes and reactions shared between wire and store
//! - Input validation for aliases, channel names and message bodies
//! - Classical IRC wire-line parsing and numeric replies for the
//!   compatibility endpoint

#![deny(clippy::all)]

pub mod chan;
pub mod envelope;
pub mod error;
pub mod line;
pub mod message;
pub mod roles;
pub mod validate;

pub use chan::ChannelMode;
pub use envelope::{ClientEvent, PresenceStatus, ServerEvent};
pub use error::ErrorCode;
pub use message::{EncryptedPayload, MessageKind, MessageRecord, Reaction, Scope};
pub use roles::Role;
