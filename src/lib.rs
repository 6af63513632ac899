//! Core library for playlist-insights
pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod util;

pub use error::{Error, Result};
