//! Data-source boundary and concrete backends

pub mod geojson;
pub mod memory;
pub mod ornl;
pub mod source;

// Re-export main types
pub use geojson::{aoi_from_geojson, aoi_from_geojson_file};
pub use memory::{GridGeometry, MemoryComposite, MemoryScene, MemorySource};
pub use ornl::{OrnlComposite, OrnlSource};
pub use source::{GeoDataSource, DEFAULT_MAX_SAMPLES};
