//! Network layer: listener, request routing and per-session loops.

pub mod connection;
pub mod gateway;
pub mod http;
pub mod origin;

pub use gateway::Gateway;
