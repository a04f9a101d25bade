//! Adapter for the ORNL DAAC MODIS fixed-subset web service
//!
//! The service (`https://modis.ornl.gov/rst/api/v1`) serves MODIS land
//! product subsets around a point, unauthenticated, as JSON. One subset
//! request returns every 16-day composite in a date range for a window of
//! `kmAboveBelow`/`kmLeftRight` kilometers around the center, on the native
//! sinusoidal grid. This adapter turns those subsets into the
//! [`GeoDataSource`] operations: per-pixel temporal mean over a calendar
//! year, then a spatial mean of the pixels whose centers fall inside the AOI.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use serde::Deserialize;

use crate::core::geometry::{sinusoidal_to_lonlat, AreaOfInterest, METERS_PER_DEGREE};
use crate::io::source::{GeoDataSource, DEFAULT_MAX_SAMPLES};
use crate::types::{DataProduct, TemporalWindow, VegError, VegResult};

/// Production endpoint of the fixed-subset REST service
pub const ORNL_BASE_URL: &str = "https://modis.ornl.gov/rst/api/v1";

/// Largest window half-size the service accepts, kilometers
const MAX_WINDOW_KM: f64 = 100.0;

/// Days per subset request, keeping each request under the service's
/// per-call composite limit at the 16-day cadence
const CHUNK_DAYS: i64 = 144;

/// Mean composite raster produced by [`OrnlSource`]
///
/// Pixels are on the MODIS sinusoidal grid; `xll`/`yll` are the sinusoidal
/// coordinates of the lower-left corner in meters. NaN marks pixels with no
/// valid observation in the window.
#[derive(Debug, Clone)]
pub struct OrnlComposite {
    grid: Array2<f64>,
    xll: f64,
    yll: f64,
    cellsize: f64,
}

impl OrnlComposite {
    pub fn grid(&self) -> &Array2<f64> {
        &self.grid
    }

    /// Native pixel size in meters (~231.66 for the 250 m products)
    pub fn cellsize(&self) -> f64 {
        self.cellsize
    }

    /// Sinusoidal coordinates of a pixel center, row 0 northernmost
    fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (rows, _) = self.grid.dim();
        let x = self.xll + (col as f64 + 0.5) * self.cellsize;
        let y = self.yll + (rows - row) as f64 * self.cellsize - 0.5 * self.cellsize;
        (x, y)
    }
}

/// MODIS subset source backed by the ORNL DAAC REST service
///
/// The service is public and needs no credentials. One instance owns one
/// HTTP client and can be shared across aggregations.
#[derive(Debug, Clone)]
pub struct OrnlSource {
    client: reqwest::blocking::Client,
    base_url: String,
    product: DataProduct,
    max_samples: u64,
}

impl OrnlSource {
    /// Source for MOD13Q1 NDVI with the default 120 s request timeout
    pub fn new() -> VegResult<Self> {
        Self::configured(DataProduct::mod13q1(), Duration::from_secs(120))
    }

    /// Source for an arbitrary product and request timeout
    pub fn configured(product: DataProduct, timeout: Duration) -> VegResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "verdine/",
                env!("CARGO_PKG_VERSION"),
                " (NDVI aggregation library)"
            ))
            .build()
            .map_err(|e| {
                VegError::SourceUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: ORNL_BASE_URL.to_string(),
            product,
            max_samples: DEFAULT_MAX_SAMPLES,
        })
    }

    /// Point the source at a different endpoint (mainly for tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Lower the spatial-reduction sample budget
    pub fn with_max_samples(mut self, max_samples: u64) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn product(&self) -> &DataProduct {
        &self.product
    }

    /// Service band identifier for a canonical band name
    /// (e.g. "NDVI" -> "250m_16_days_NDVI")
    fn service_band(&self, band: &str) -> String {
        format!("250m_16_days_{}", band)
    }

    /// Window half-sizes in whole kilometers covering the AOI bbox
    fn window_km(aoi: &AreaOfInterest) -> VegResult<(u32, u32)> {
        let bbox = aoi.bounding_box();
        let (_, center_lat) = bbox.center();
        let half_height_km =
            (bbox.max_lat - bbox.min_lat) / 2.0 * METERS_PER_DEGREE / 1_000.0;
        let half_width_km = (bbox.max_lon - bbox.min_lon) / 2.0
            * METERS_PER_DEGREE
            * center_lat.to_radians().cos()
            / 1_000.0;
        if half_height_km > MAX_WINDOW_KM || half_width_km > MAX_WINDOW_KM {
            return Err(VegError::InvalidGeometry(format!(
                "AOI spans ~{:.0}x{:.0} km; the subset service serves at most \
                 +/-{} km around a point",
                half_width_km * 2.0,
                half_height_km * 2.0,
                MAX_WINDOW_KM
            )));
        }
        Ok((
            (half_height_km.ceil() as u32).max(1),
            (half_width_km.ceil() as u32).max(1),
        ))
    }

    /// One subset request for `[start, end]` (inclusive service dates)
    fn fetch_subset(
        &self,
        lat: f64,
        lon: f64,
        band: &str,
        start: NaiveDate,
        end: NaiveDate,
        km_above_below: u32,
        km_left_right: u32,
    ) -> VegResult<SubsetResponse> {
        let url = format!(
            "{}/{}/subset?latitude={}&longitude={}&band={}&startDate={}&endDate={}\
             &kmAboveBelow={}&kmLeftRight={}",
            self.base_url,
            self.product.code,
            lat,
            lon,
            band,
            modis_date(start),
            modis_date(end),
            km_above_below,
            km_left_right
        );
        log::debug!("Requesting subset: {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| VegError::SourceUnavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(VegError::SourceUnavailable(format!(
                "Subset service returned HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }
        if !status.is_success() {
            return Err(VegError::InvalidFormat(format!(
                "Subset service rejected the request with HTTP {}: {}",
                status.as_u16(),
                url
            )));
        }

        let body = response
            .text()
            .map_err(|e| VegError::SourceUnavailable(format!("Failed to read response: {}", e)))?;
        serde_json::from_str(&body).map_err(|e| {
            VegError::InvalidFormat(format!("Unparseable subset response: {}", e))
        })
    }
}

impl GeoDataSource for OrnlSource {
    type Raster = OrnlComposite;

    fn mean_composite(
        &self,
        aoi: &AreaOfInterest,
        window: &TemporalWindow,
        band: &str,
    ) -> VegResult<Option<OrnlComposite>> {
        let (km_above_below, km_left_right) = Self::window_km(aoi)?;
        let (center_lon, center_lat) = aoi.bounding_box().center();
        let band = self.service_band(band);

        // The service caps composites per call, so walk the window in chunks
        let mut entries: Vec<SubsetEntry> = Vec::new();
        let mut shape: Option<(SubsetResponse, usize, usize)> = None;
        let mut chunk_start = window.start;
        while chunk_start < window.end {
            let chunk_end = (chunk_start + chrono::Duration::days(CHUNK_DAYS - 1))
                .min(window.last_day());
            let response = self.fetch_subset(
                center_lat,
                center_lon,
                &band,
                chunk_start,
                chunk_end,
                km_above_below,
                km_left_right,
            )?;
            entries.extend(response.subset.iter().cloned());
            if shape.is_none() {
                let (rows, cols) = (response.nrows, response.ncols);
                shape = Some((response, rows, cols));
            }
            chunk_start = chunk_end + chrono::Duration::days(1);
        }

        let (response, rows, cols) = match shape {
            Some(shape) => shape,
            None => return Ok(None),
        };
        if entries.is_empty() {
            log::debug!("No composites served for {} in {}", band, window);
            return Ok(None);
        }
        if rows == 0 || cols == 0 {
            return Err(VegError::InvalidFormat(
                "Subset response has an empty grid".to_string(),
            ));
        }

        let mut sum = Array2::<f64>::zeros((rows, cols));
        let mut count = Array2::<f64>::zeros((rows, cols));
        let mut used = 0usize;
        for entry in &entries {
            let date = NaiveDate::parse_from_str(&entry.calendar_date, "%Y-%m-%d")
                .map_err(|e| {
                    VegError::InvalidFormat(format!(
                        "Bad composite date '{}': {}",
                        entry.calendar_date, e
                    ))
                })?;
            if !window.contains(date) {
                continue;
            }
            if entry.data.len() != rows * cols {
                return Err(VegError::InvalidFormat(format!(
                    "Composite {} carries {} values for a {}x{} grid",
                    entry.calendar_date,
                    entry.data.len(),
                    rows,
                    cols
                )));
            }
            for (i, &value) in entry.data.iter().enumerate() {
                if self.product.is_valid_raw(value) {
                    sum[[i / cols, i % cols]] += value;
                    count[[i / cols, i % cols]] += 1.0;
                }
            }
            used += 1;
        }
        if used == 0 {
            return Ok(None);
        }

        let grid = Array2::from_shape_fn((rows, cols), |(row, col)| {
            if count[[row, col]] > 0.0 {
                sum[[row, col]] / count[[row, col]]
            } else {
                f64::NAN
            }
        });
        log::debug!(
            "Composited {} of {} served date(s) into a {}x{} sinusoidal grid",
            used,
            entries.len(),
            rows,
            cols
        );
        Ok(Some(OrnlComposite {
            grid,
            xll: response.xllcorner,
            yll: response.yllcorner,
            cellsize: response.cellsize,
        }))
    }

    fn spatial_mean(
        &self,
        raster: &OrnlComposite,
        aoi: &AreaOfInterest,
        resolution_m: f64,
    ) -> VegResult<Option<f64>> {
        if !(resolution_m > 0.0) {
            return Err(VegError::InvalidFormat(format!(
                "Sampling resolution must be positive, got {}",
                resolution_m
            )));
        }
        let (rows, cols) = raster.grid.dim();
        // Sampling coarser than the native grid strides over pixels
        let stride = ((resolution_m / raster.cellsize).round() as usize).max(1);
        let samples = (((rows + stride - 1) / stride) as u64) * (((cols + stride - 1) / stride) as u64);
        if samples > self.max_samples {
            return Err(VegError::InvalidGeometry(format!(
                "Reduction would evaluate {} samples, exceeding the {} limit; \
                 shrink the AOI or coarsen the resolution",
                samples, self.max_samples
            )));
        }

        let mut sum = 0.0;
        let mut valid = 0u64;
        for row in (0..rows).step_by(stride) {
            for col in (0..cols).step_by(stride) {
                let (x, y) = raster.pixel_center(row, col);
                let (lon, lat) = sinusoidal_to_lonlat(x, y);
                if !aoi.contains(lon, lat) {
                    continue;
                }
                let value = raster.grid[[row, col]];
                if value.is_finite() {
                    sum += value;
                    valid += 1;
                }
            }
        }

        // An AOI narrower than one pixel may miss every center
        if valid == 0 {
            if let Some(value) = nearest_valid_pixel(raster, aoi) {
                sum += value;
                valid += 1;
            }
        }

        if valid == 0 {
            log::debug!("No valid pixel centers inside the AOI");
            return Ok(None);
        }
        log::debug!("Spatial mean over {} pixel(s) at stride {}", valid, stride);
        Ok(Some(sum / valid as f64))
    }
}

/// Valid pixel whose center is closest to the AOI's interior point
fn nearest_valid_pixel(raster: &OrnlComposite, aoi: &AreaOfInterest) -> Option<f64> {
    let (lon0, lat0) = aoi.interior_point()?;
    let (rows, cols) = raster.grid.dim();
    let mut best: Option<(f64, f64)> = None;
    for row in 0..rows {
        for col in 0..cols {
            let value = raster.grid[[row, col]];
            if !value.is_finite() {
                continue;
            }
            let (x, y) = raster.pixel_center(row, col);
            let (lon, lat) = sinusoidal_to_lonlat(x, y);
            let d2 = (lon - lon0).powi(2) + (lat - lat0).powi(2);
            if best.map_or(true, |(bd2, _)| d2 < bd2) {
                best = Some((d2, value));
            }
        }
    }
    // Only accept a neighbor within roughly one pixel of the AOI
    let (d2, value) = best?;
    let pixel_deg = raster.cellsize / METERS_PER_DEGREE;
    (d2.sqrt() <= 2.0 * pixel_deg).then_some(value)
}

/// Service date code for a calendar date (e.g. 2016-01-01 -> "A2016001")
fn modis_date(date: NaiveDate) -> String {
    format!("A{}{:03}", date.year(), date.ordinal())
}

#[derive(Debug, Clone, Deserialize)]
struct SubsetResponse {
    #[serde(deserialize_with = "f64_from_any")]
    xllcorner: f64,
    #[serde(deserialize_with = "f64_from_any")]
    yllcorner: f64,
    #[serde(deserialize_with = "f64_from_any")]
    cellsize: f64,
    nrows: usize,
    ncols: usize,
    #[serde(default)]
    subset: Vec<SubsetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubsetEntry {
    calendar_date: String,
    data: Vec<f64>,
}

/// The service serves corner coordinates sometimes as numbers, sometimes as
/// strings; accept both
fn f64_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("number out of f64 range")),
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}
