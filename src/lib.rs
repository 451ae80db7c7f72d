pub mod config;
pub mod error;
pub mod context;
pub mod model;
pub mod graph;
pub mod cache;
pub mod repository;
pub mod db;
pub mod http;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use context::RequestContext;
pub use error::{LineageError, Result};
