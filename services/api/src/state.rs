//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the settings store and the response providers.

use crate::config::Config;
use std::sync::Arc;
use tutor_core::config::ConfigStore;
use tutor_core::provider::{ProviderRegistry, ResponseProvider};
use tutor_core::session::SessionOptions;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The student's persisted preferences, shared by every lecture session.
    pub settings: Arc<ConfigStore>,
    /// Providers available to lecture sessions.
    pub providers: ProviderRegistry,
    /// Backend of the server-mediated endpoint, called with the server's key.
    pub proxy: Arc<dyn ResponseProvider>,
    pub system_prompt: Arc<String>,
}

impl AppState {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            system_prompt: self.system_prompt.as_ref().clone(),
            pacing: self.config.pacing,
            ..SessionOptions::default()
        }
    }
}
