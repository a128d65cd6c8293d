pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod layers;
pub mod models;
pub mod search;
pub mod services;

pub use config::Config;
pub use error::{RecallError, Result};
pub use services::{Indexes, RetrievalCoordinator};
