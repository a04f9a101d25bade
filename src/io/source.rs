use crate::core::geometry::AreaOfInterest;
use crate::types::{TemporalWindow, VegResult};

/// Upper bound on the number of samples one spatial reduction may evaluate
pub const DEFAULT_MAX_SAMPLES: u64 = 1_000_000_000;

/// Boundary to the geospatial data/compute service
///
/// An implementation answers two questions: "what does the mean image over
/// this window look like" (`mean_composite`) and "what is the area mean of
/// that image inside the AOI" (`spatial_mean`). The raster handle in
/// between stays opaque to callers.
///
/// Semantics:
/// - `mean_composite` returns `Ok(None)` when no source imagery intersects
///   the window for the AOI.
/// - `spatial_mean` returns `Ok(None)` when the reduction is undefined
///   (AOI fully outside coverage, or every pixel masked).
/// - `VegError::SourceUnavailable` marks transient backend failures and is
///   the only error class worth retrying.
pub trait GeoDataSource {
    /// Opaque handle to a computed composite raster
    type Raster;

    /// Per-pixel temporal mean of `band` over all imagery in `window`
    /// intersecting the AOI
    fn mean_composite(
        &self,
        aoi: &AreaOfInterest,
        window: &TemporalWindow,
        band: &str,
    ) -> VegResult<Option<Self::Raster>>;

    /// Mean of the raster's valid pixels inside the AOI, sampled at
    /// `resolution_m` meters
    fn spatial_mean(
        &self,
        raster: &Self::Raster,
        aoi: &AreaOfInterest,
        resolution_m: f64,
    ) -> VegResult<Option<f64>>;
}
