//! Custom Axum extractors.

mod content_range;
mod path_params;

pub use content_range::ContentRange;
pub use path_params::{CacheIdPath, CacheKeyPath, CACHE_ID_PARAM, KEY_PARAM};
