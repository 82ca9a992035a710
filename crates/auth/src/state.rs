//! Application state shared across request handlers.

use crate::service::AuthService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
}

impl AppState {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }
}
