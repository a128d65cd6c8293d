mod extraction;

pub use extraction::{fingerprint, CacheKey, CacheStats, CachedEntry, ExtractionCache};
