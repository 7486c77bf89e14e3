//! Local HTTP API for the studio

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::studio::Studio;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub studio: Studio,
}

impl AppState {
    pub fn new(studio: Studio) -> Self {
        Self { studio }
    }
}
