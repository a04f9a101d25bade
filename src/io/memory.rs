use crate::core::geometry::{degree_steps, AreaOfInterest};
use crate::io::source::{GeoDataSource, DEFAULT_MAX_SAMPLES};
use crate::types::{BoundingBox, TemporalWindow, VegError, VegResult};
use chrono::NaiveDate;
use ndarray::Array2;

/// Georeferencing of a north-up lon/lat grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    /// Longitude of the grid's western edge
    pub origin_lon: f64,
    /// Latitude of the grid's northern edge
    pub origin_lat: f64,
    /// Pixel width in degrees (eastward)
    pub pixel_width: f64,
    /// Pixel height in degrees (rows advance southward)
    pub pixel_height: f64,
}

impl GridGeometry {
    /// Extent of a grid with the given shape
    pub fn extent(&self, rows: usize, cols: usize) -> BoundingBox {
        BoundingBox {
            min_lon: self.origin_lon,
            max_lon: self.origin_lon + cols as f64 * self.pixel_width,
            min_lat: self.origin_lat - rows as f64 * self.pixel_height,
            max_lat: self.origin_lat,
        }
    }

    /// Nearest-neighbor sample; `None` outside the grid or on a masked pixel
    pub fn sample(&self, grid: &Array2<f64>, lon: f64, lat: f64) -> Option<f64> {
        let col = ((lon - self.origin_lon) / self.pixel_width).floor();
        let row = ((self.origin_lat - lat) / self.pixel_height).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (rows, cols) = grid.dim();
        let (row, col) = (row as usize, col as usize);
        if row >= rows || col >= cols {
            return None;
        }
        let value = grid[[row, col]];
        value.is_finite().then_some(value)
    }
}

/// One dated acquisition held in memory (NaN = masked pixel)
#[derive(Debug, Clone)]
pub struct MemoryScene {
    pub date: NaiveDate,
    pub grid: Array2<f64>,
}

/// Composite raster produced by [`MemorySource`]
#[derive(Debug, Clone)]
pub struct MemoryComposite {
    grid: Array2<f64>,
    geometry: GridGeometry,
}

impl MemoryComposite {
    /// Per-pixel temporal mean values (NaN where every scene was masked)
    pub fn grid(&self) -> &Array2<f64> {
        &self.grid
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }
}

/// In-memory scene stack implementing the data-source boundary
///
/// Useful for tests and for workflows where imagery was already ingested by
/// other means. Raw values use the product's stored scale (e.g. 8000 for an
/// NDVI of 0.8).
#[derive(Debug, Clone)]
pub struct MemorySource {
    band: String,
    geometry: GridGeometry,
    scenes: Vec<MemoryScene>,
    max_samples: u64,
}

impl MemorySource {
    pub fn new(band: impl Into<String>, geometry: GridGeometry) -> Self {
        Self {
            band: band.into(),
            geometry,
            scenes: Vec::new(),
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    /// Lower the spatial-reduction sample budget (mainly for tests)
    pub fn with_max_samples(mut self, max_samples: u64) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Add one acquisition; all scenes must share the grid shape
    pub fn add_scene(&mut self, date: NaiveDate, grid: Array2<f64>) -> VegResult<()> {
        if let Some(first) = self.scenes.first() {
            if first.grid.dim() != grid.dim() {
                return Err(VegError::InvalidFormat(format!(
                    "Scene shape {:?} does not match existing shape {:?}",
                    grid.dim(),
                    first.grid.dim()
                )));
            }
        }
        self.scenes.push(MemoryScene { date, grid });
        Ok(())
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}

impl GeoDataSource for MemorySource {
    type Raster = MemoryComposite;

    fn mean_composite(
        &self,
        aoi: &AreaOfInterest,
        window: &TemporalWindow,
        band: &str,
    ) -> VegResult<Option<MemoryComposite>> {
        if band != self.band {
            log::debug!("Band {} not held by this source (has {})", band, self.band);
            return Ok(None);
        }
        let first = match self.scenes.first() {
            Some(scene) => scene,
            None => return Ok(None),
        };
        let (rows, cols) = first.grid.dim();
        if !self.geometry.extent(rows, cols).intersects(&aoi.bounding_box()) {
            log::debug!("AOI does not intersect the held extent");
            return Ok(None);
        }

        let selected: Vec<&MemoryScene> = self
            .scenes
            .iter()
            .filter(|scene| window.contains(scene.date))
            .collect();
        if selected.is_empty() {
            return Ok(None);
        }

        let mut sum = Array2::<f64>::zeros((rows, cols));
        let mut count = Array2::<f64>::zeros((rows, cols));
        for scene in &selected {
            for ((row, col), &value) in scene.grid.indexed_iter() {
                if value.is_finite() {
                    sum[[row, col]] += value;
                    count[[row, col]] += 1.0;
                }
            }
        }
        let grid = Array2::from_shape_fn((rows, cols), |(row, col)| {
            if count[[row, col]] > 0.0 {
                sum[[row, col]] / count[[row, col]]
            } else {
                f64::NAN
            }
        });

        log::debug!(
            "Composited {} scene(s) in {} into a {}x{} grid",
            selected.len(),
            window,
            rows,
            cols
        );
        Ok(Some(MemoryComposite {
            grid,
            geometry: self.geometry,
        }))
    }

    fn spatial_mean(
        &self,
        raster: &MemoryComposite,
        aoi: &AreaOfInterest,
        resolution_m: f64,
    ) -> VegResult<Option<f64>> {
        if !(resolution_m > 0.0) {
            return Err(VegError::InvalidFormat(format!(
                "Sampling resolution must be positive, got {}",
                resolution_m
            )));
        }

        let bbox = aoi.bounding_box();
        let (_, center_lat) = bbox.center();
        let (lon_step, lat_step) = degree_steps(resolution_m, center_lat);

        let estimated = ((bbox.max_lon - bbox.min_lon) / lon_step).ceil().max(1.0)
            * ((bbox.max_lat - bbox.min_lat) / lat_step).ceil().max(1.0);
        if estimated > self.max_samples as f64 {
            return Err(VegError::InvalidGeometry(format!(
                "Reduction would evaluate ~{:.0} samples, exceeding the {} limit; \
                 shrink the AOI or coarsen the resolution",
                estimated, self.max_samples
            )));
        }

        let mut sum = 0.0;
        let mut valid = 0u64;
        let mut lat = bbox.min_lat + lat_step / 2.0;
        while lat < bbox.max_lat {
            let mut lon = bbox.min_lon + lon_step / 2.0;
            while lon < bbox.max_lon {
                if aoi.contains(lon, lat) {
                    if let Some(value) = raster.geometry.sample(&raster.grid, lon, lat) {
                        sum += value;
                        valid += 1;
                    }
                }
                lon += lon_step;
            }
            lat += lat_step;
        }

        // AOIs smaller than one lattice step still deserve a sample
        if valid == 0 {
            if let Some((lon, lat)) = aoi.interior_point() {
                if let Some(value) = raster.geometry.sample(&raster.grid, lon, lat) {
                    sum += value;
                    valid += 1;
                }
            }
        }

        if valid == 0 {
            log::debug!("No valid samples inside the AOI at {} m", resolution_m);
            return Ok(None);
        }
        log::debug!("Spatial mean over {} sample(s) at {} m", valid, resolution_m);
        Ok(Some(sum / valid as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn degree_grid() -> GridGeometry {
        // 0.05° pixels over a 1°x1° tile anchored at (85E, 21N)
        GridGeometry {
            origin_lon: 85.0,
            origin_lat: 21.0,
            pixel_width: 0.05,
            pixel_height: 0.05,
        }
    }

    fn uniform_source(value: f64) -> MemorySource {
        let mut source = MemorySource::new("NDVI", degree_grid());
        source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 6, 1).unwrap(),
                Array2::from_elem((20, 20), value),
            )
            .unwrap();
        source
    }

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::from_rect(85.2, 20.2, 85.6, 20.6).unwrap()
    }

    #[test]
    fn test_composite_means_scenes_per_pixel() {
        let mut source = MemorySource::new("NDVI", degree_grid());
        source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(),
                Array2::from_elem((20, 20), 6_000.0),
            )
            .unwrap();
        source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 9, 1).unwrap(),
                Array2::from_elem((20, 20), 8_000.0),
            )
            .unwrap();

        let window = TemporalWindow::calendar_year(2016).unwrap();
        let composite = source
            .mean_composite(&aoi(), &window, "NDVI")
            .unwrap()
            .unwrap();
        assert!((composite.grid()[[0, 0]] - 7_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_masked_pixels_are_excluded_from_composite() {
        let mut source = MemorySource::new("NDVI", degree_grid());
        let mut cloudy = Array2::from_elem((20, 20), 6_000.0);
        cloudy[[0, 0]] = f64::NAN;
        source
            .add_scene(NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(), cloudy)
            .unwrap();
        source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 9, 1).unwrap(),
                Array2::from_elem((20, 20), 8_000.0),
            )
            .unwrap();

        let window = TemporalWindow::calendar_year(2016).unwrap();
        let composite = source
            .mean_composite(&aoi(), &window, "NDVI")
            .unwrap()
            .unwrap();
        // Only the clear scene contributes at the masked pixel
        assert!((composite.grid()[[0, 0]] - 8_000.0).abs() < 1e-9);
        assert!((composite.grid()[[1, 1]] - 7_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_yields_no_composite() {
        let source = uniform_source(7_500.0);
        let window = TemporalWindow::calendar_year(2019).unwrap();
        assert!(source
            .mean_composite(&aoi(), &window, "NDVI")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_band_mismatch_yields_no_composite() {
        let source = uniform_source(7_500.0);
        let window = TemporalWindow::calendar_year(2016).unwrap();
        assert!(source
            .mean_composite(&aoi(), &window, "EVI")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_disjoint_aoi_yields_no_composite() {
        let source = uniform_source(7_500.0);
        let window = TemporalWindow::calendar_year(2016).unwrap();
        let far_away = AreaOfInterest::from_rect(-120.0, 35.0, -119.5, 35.5).unwrap();
        assert!(source
            .mean_composite(&far_away, &window, "NDVI")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_spatial_mean_over_uniform_grid() {
        let source = uniform_source(7_500.0);
        let window = TemporalWindow::calendar_year(2016).unwrap();
        let composite = source
            .mean_composite(&aoi(), &window, "NDVI")
            .unwrap()
            .unwrap();
        let mean = source
            .spatial_mean(&composite, &aoi(), 250.0)
            .unwrap()
            .unwrap();
        assert!((mean - 7_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_masked_reduction_is_undefined() {
        let mut source = MemorySource::new("NDVI", degree_grid());
        source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 6, 1).unwrap(),
                Array2::from_elem((20, 20), f64::NAN),
            )
            .unwrap();
        let window = TemporalWindow::calendar_year(2016).unwrap();
        let composite = source
            .mean_composite(&aoi(), &window, "NDVI")
            .unwrap()
            .unwrap();
        assert!(source
            .spatial_mean(&composite, &aoi(), 250.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sample_budget_guard() {
        let source = uniform_source(7_500.0).with_max_samples(10);
        let window = TemporalWindow::calendar_year(2016).unwrap();
        let composite = source
            .mean_composite(&aoi(), &window, "NDVI")
            .unwrap()
            .unwrap();
        let err = source.spatial_mean(&composite, &aoi(), 250.0).unwrap_err();
        assert!(matches!(err, VegError::InvalidGeometry(_)));
    }

    #[test]
    fn test_tiny_aoi_falls_back_to_interior_point() {
        let source = uniform_source(9_000.0);
        let window = TemporalWindow::calendar_year(2016).unwrap();
        // ~110 m across, well under the 250 m lattice step
        let tiny = AreaOfInterest::from_rect(85.3, 20.3, 85.301, 20.301).unwrap();
        let composite = source
            .mean_composite(&tiny, &window, "NDVI")
            .unwrap()
            .unwrap();
        let mean = source
            .spatial_mean(&composite, &tiny, 250.0)
            .unwrap()
            .unwrap();
        assert!((mean - 9_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_scene_shape_mismatch_rejected() {
        let mut source = MemorySource::new("NDVI", degree_grid());
        source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 6, 1).unwrap(),
                Array2::from_elem((20, 20), 1.0),
            )
            .unwrap();
        let err = source
            .add_scene(
                NaiveDate::from_ymd_opt(2016, 7, 1).unwrap(),
                Array2::from_elem((10, 10), 1.0),
            )
            .unwrap_err();
        assert!(matches!(err, VegError::InvalidFormat(_)));
    }
}
