pub mod cache;
pub mod checker;
pub mod geo;
pub mod inventory;
pub mod issues;
pub mod selection;

pub use cache::{CacheStats, ResponseCache};
pub use checker::CheckerPipeline;
pub use geo::{GeoIpResolver, Location, LocationResolver};
pub use selection::{MirrorSelector, Selection, SelectionError};
