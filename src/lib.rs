//! Serve registered host directories over HTTP.
//!
//! Shared roots are kept in a SQLite-backed [`registry::ShareRegistry`]. Every
//! listing and download is checked against them by [`guard::PathGuard`]
//! before the filesystem is touched.

pub mod config;
pub mod disk;
pub mod error;
pub mod guard;
pub mod listing;
pub mod media;
pub mod pages;
pub mod registry;
pub mod server;
pub mod streamer;

pub use error::ApiError;
pub use server::{router, AppState, SharedState};
