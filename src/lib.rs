pub mod core;
pub mod extract;
pub mod features;
pub mod harvest;
pub mod scraping;

// --- Primary core exports ---
pub use crate::core::config;
pub use crate::core::types;
pub use crate::core::types::*;

// --- Convenience module paths ---
pub use crate::extract::postprocess;
pub use crate::features::session_store;
pub use crate::harvest::{harvest_feed, harvest_search, HarvestError, SearchTarget};
pub use crate::scraping::{browser_manager, interceptor};
