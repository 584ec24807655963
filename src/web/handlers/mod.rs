//! API handlers.

pub mod file;

pub use file::*;

use crate::file::FileService;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// File operations.
    pub files: FileService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(files: FileService) -> Self {
        Self { files }
    }
}
