//! Verdine: A Fast, Modular NDVI Time-Series and Carbon-Proxy Aggregator
//!
//! This library turns an area of interest and an inclusive year range into a
//! sparse per-year table of spatially averaged NDVI values with derived
//! biomass, carbon and CO2 estimates. The geospatial data/compute backend is
//! abstracted behind the [`GeoDataSource`] trait, with an in-memory scene
//! stack for offline use and an adapter for the ORNL DAAC MODIS subset
//! service for production.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, DataProduct, NdviSeries, TemporalWindow, VegError, VegResult, YearRange,
    YearlyRecord,
};

pub use core::{
    AggregationParams, AreaOfInterest, BiomassEstimate, BiomassModel, CancelToken, FailurePolicy,
    LinearBiomassModel, NdviAggregator, RetryPolicy,
};

pub use io::{aoi_from_geojson, aoi_from_geojson_file, GeoDataSource, MemorySource, OrnlSource};
