use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive range of calendar years to aggregate over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    /// Create a year range, rejecting reversed bounds
    pub fn new(start: i32, end: i32) -> VegResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Check the ordering invariant (`start <= end`)
    pub fn validate(&self) -> VegResult<()> {
        if self.start > self.end {
            return Err(VegError::InvalidRange(format!(
                "Start year {} is after end year {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Iterate the years in ascending order, inclusive on both ends
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }

    /// Number of years requested
    pub fn len(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl std::fmt::Display for YearRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Half-open temporal window `[start, end)` used to select source imagery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TemporalWindow {
    /// Window covering one calendar year: `[Jan 1 of y, Jan 1 of y+1)`
    pub fn calendar_year(year: i32) -> VegResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| {
            VegError::InvalidRange(format!("Year {} is outside the representable date range", year))
        })?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(|| {
            VegError::InvalidRange(format!("Year {} is outside the representable date range", year))
        })?;
        Ok(Self { start, end })
    }

    /// Whether a date falls inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    /// Last date inside the window (for services that take inclusive bounds)
    pub fn last_day(&self) -> NaiveDate {
        self.end.pred_opt().unwrap_or(self.start)
    }
}

impl std::fmt::Display for TemporalWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Geospatial bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Center point as (lon, lat)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Whether two boxes overlap (shared edges count as overlap)
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }
}

/// Description of a satellite vegetation-index product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProduct {
    /// Product short code (e.g. "MOD13Q1")
    pub code: String,
    /// Canonical band name requested from data sources
    pub band: String,
    /// Divisor turning raw stored values into index values
    pub scale_factor: f64,
    /// Smallest raw value considered valid
    pub valid_min: f64,
    /// Largest raw value considered valid
    pub valid_max: f64,
    /// Raw value marking missing/masked pixels
    pub fill_value: f64,
    /// Native ground sampling distance in meters
    pub native_resolution_m: f64,
    /// First calendar year with data
    pub first_year: i32,
}

impl DataProduct {
    /// MODIS Terra 16-day 250 m vegetation indices (the product the
    /// aggregator was built around)
    pub fn mod13q1() -> Self {
        Self {
            code: "MOD13Q1".to_string(),
            band: "NDVI".to_string(),
            scale_factor: 10_000.0,
            valid_min: -2_000.0,
            valid_max: 10_000.0,
            fill_value: -3_000.0,
            native_resolution_m: 250.0,
            first_year: 2000,
        }
    }

    /// Last calendar year with complete coverage (the current UTC year is
    /// still being acquired)
    pub fn last_complete_year() -> i32 {
        Utc::now().year() - 1
    }

    /// Whether a year falls inside this product's temporal coverage
    pub fn covers(&self, year: i32) -> bool {
        year >= self.first_year && year <= Self::last_complete_year()
    }

    /// Whether a raw stored value is a usable measurement
    pub fn is_valid_raw(&self, value: f64) -> bool {
        value.is_finite()
            && value != self.fill_value
            && value >= self.valid_min
            && value <= self.valid_max
    }
}

impl Default for DataProduct {
    fn default() -> Self {
        Self::mod13q1()
    }
}

/// One aggregated year of the result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyRecord {
    pub year: i32,
    /// Spatially and temporally averaged raw index value (product scale)
    pub ndvi_raw: f64,
    /// Raw value divided by the product scale factor, nominally in [-1, 1]
    pub ndvi_normalized: f64,
    pub biomass: f64,
    pub carbon: f64,
    pub co2: f64,
}

/// Ordered sparse table of yearly records
///
/// Years with no usable source data are omitted rather than emitted as
/// null/zero rows. An empty `records` with a non-empty requested `range` is
/// the distinguished "no data anywhere" outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdviSeries {
    /// The range the caller asked for
    pub range: YearRange,
    /// Surviving records in strictly ascending year order
    pub records: Vec<YearlyRecord>,
}

impl NdviSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when every requested year was skipped
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Years present in the table, ascending
    pub fn years(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    /// Record for a specific year, if that year survived
    pub fn get(&self, year: i32) -> Option<&YearlyRecord> {
        self.records.iter().find(|r| r.year == year)
    }
}

/// Error types for NDVI aggregation
#[derive(Debug, thiserror::Error)]
pub enum VegError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid year range: {0}")]
    InvalidRange(String),

    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VegError {
    /// Whether retrying the operation can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, VegError::SourceUnavailable(_))
    }
}

/// Result type for aggregation operations
pub type VegResult<T> = Result<T, VegError>;
