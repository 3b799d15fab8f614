//! WebSocket Session Management
//!
//! This module contains the core logic for running trainer sessions over
//! WebSockets. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from upgrade to termination.
//! - `runtime`: The cooperative event loop driving classification ticks, timers, and cues.

pub mod protocol;
mod runtime;
pub mod session;

pub use session::ws_handler;
