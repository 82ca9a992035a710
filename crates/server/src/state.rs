//! Application state shared across request handlers.

use std::sync::Arc;

use forum_shared::TokenService;

use crate::chat::Hub;
use crate::store::{MessageStore, PostRepository};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub posts: Arc<dyn PostRepository>,
    pub messages: Arc<dyn MessageStore>,
    pub tokens: TokenService,
    pub hub: Hub,
}

impl AppState {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        messages: Arc<dyn MessageStore>,
        tokens: TokenService,
        hub: Hub,
    ) -> Self {
        Self {
            posts,
            messages,
            tokens,
            hub,
        }
    }
}
