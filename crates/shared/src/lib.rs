//! Shared types and utilities for the forum auth and forum services.

pub mod models;
pub mod token;
pub mod error;

pub use models::*;
pub use token::*;
pub use error::*;
