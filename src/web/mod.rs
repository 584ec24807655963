//! HTTP API for filestore.
//!
//! A thin axum layer over [`FileService`](crate::file::FileService):
//! JWT bearer verification, multipart upload, streamed download and preview,
//! soft and hard deletion.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::create_router;
pub use server::WebServer;
