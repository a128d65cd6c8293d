mod api;
mod provider;


pub use api::{default_base_url, ApiConfig, EmbeddingApiClient};
pub use provider::{Embedder, EmbeddingProvider};
