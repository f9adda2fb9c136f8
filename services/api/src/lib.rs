//! AI Tutor API Library Crate
//!
//! This library contains all the core logic for the tutor web service,
//! including the application state, REST handlers, WebSocket lecture
//! sessions, and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod router;
pub mod state;
pub mod ws;
