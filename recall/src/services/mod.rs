mod retrieval;

pub use retrieval::{Indexes, RetrievalCoordinator};
