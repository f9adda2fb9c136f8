//! WebSocket Lecture Sessions
//!
//! This module connects a browser to a [`tutor_core::session::TutorSession`].
//! It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `speech`: Speech output and input adapters that delegate to the browser.

pub mod protocol;
pub mod session;
pub mod speech;

pub use session::ws_handler;
