pub mod fusion;
mod graph;
mod hierarchy;
mod lexical;
mod vector;

pub use fusion::{fuse, DEFAULT_RRF_K};
pub use graph::{clamp_decay, GraphSearch, GraphStrategy};
pub use hierarchy::HierarchyNavigator;
pub use lexical::LexicalStrategy;
pub use vector::VectorStrategy;
