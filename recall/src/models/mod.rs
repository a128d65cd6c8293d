mod candidate;
mod common;
mod graph;
mod item;
mod query;
mod result;
mod visibility;

pub use candidate::*;
pub use common::*;
pub use graph::*;
pub use item::*;
pub use query::*;
pub use result::*;
pub use visibility::*;
