//! Core aggregation modules

pub mod aggregate;
pub mod biomass;
pub mod geometry;

// Re-export main types
pub use aggregate::{
    AggregationParams, CancelToken, FailurePolicy, NdviAggregator, RetryPolicy,
};
pub use biomass::{BiomassEstimate, BiomassModel, LinearBiomassModel};
pub use geometry::AreaOfInterest;
