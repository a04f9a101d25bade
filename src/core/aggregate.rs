//! Yearly NDVI aggregation
//!
//! Walks an inclusive year range, asks a `GeoDataSource` for the mean
//! vegetation-index composite of each calendar year over an AOI, reduces
//! the composite to one spatial mean, and derives biomass, carbon and CO2
//! through a pluggable model. Years without usable data are omitted from
//! the result table instead of being reported as errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::biomass::{BiomassModel, LinearBiomassModel};
use crate::core::geometry::AreaOfInterest;
use crate::io::source::GeoDataSource;
use crate::types::{
    DataProduct, NdviSeries, TemporalWindow, VegError, VegResult, YearRange, YearlyRecord,
};

/// Bounded exponential backoff for transient source failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per remote call (1 disables retrying)
    pub max_attempts: u32,
    /// Pause before the second attempt
    pub initial_backoff: Duration,
    /// Multiplier applied to the pause after every further failure
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with retrying disabled
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Pause after the given 1-based failed attempt
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.initial_backoff.mul_f64(self.backoff_factor.powi(exponent))
    }
}

/// What to do with a year whose retries are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Omit the failing year and keep aggregating the rest
    SkipYear,
    /// Fail the whole aggregation on the first exhausted year
    Abort,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::SkipYear
    }
}

/// Cloneable cancellation flag
///
/// Clones share one flag, so a caller can keep a token, hand a clone to
/// the aggregation and flip it from another thread. A running aggregation
/// checks the flag before each year and between retry attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of any aggregation holding a clone
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Parameters controlling yearly aggregation
#[derive(Debug, Clone)]
pub struct AggregationParams {
    /// Vegetation-index product to request
    pub product: DataProduct,
    /// Sampling resolution of the spatial reduction in meters
    pub resolution_m: f64,
    /// Retry behavior for transient source failures
    pub retry: RetryPolicy,
    /// Behavior once a year's retries are exhausted
    pub failure_policy: FailurePolicy,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self::for_product(DataProduct::mod13q1())
    }
}

impl AggregationParams {
    /// Parameters for a product, sampling at its native resolution
    pub fn for_product(product: DataProduct) -> Self {
        let resolution_m = product.native_resolution_m;
        Self {
            product,
            resolution_m,
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Yearly NDVI aggregation engine
///
/// The engine owns no connection of its own. Every computation takes the
/// data source as an argument, so the same aggregator runs against the
/// remote MODIS service in production and an in-memory source in tests.
pub struct NdviAggregator<M: BiomassModel = LinearBiomassModel> {
    params: AggregationParams,
    model: M,
}

impl NdviAggregator<LinearBiomassModel> {
    /// Aggregator with default parameters and the linear proxy model
    pub fn new() -> Self {
        Self::with_params(AggregationParams::default())
    }

    /// Aggregator with custom parameters and the linear proxy model
    pub fn with_params(params: AggregationParams) -> Self {
        Self {
            params,
            model: LinearBiomassModel::default(),
        }
    }
}

impl Default for NdviAggregator<LinearBiomassModel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: BiomassModel> NdviAggregator<M> {
    /// Aggregator with a caller-supplied biomass model
    pub fn with_model(params: AggregationParams, model: M) -> Self {
        Self { params, model }
    }

    pub fn params(&self) -> &AggregationParams {
        &self.params
    }

    /// Compute the yearly NDVI table for an AOI and inclusive year range
    ///
    /// Validation of the range happens before any source call. The result
    /// is sparse: a year whose reduction is undefined (no imagery, or the
    /// AOI outside coverage) is omitted, and a table with zero records is
    /// the legitimate "no data anywhere" outcome.
    pub fn compute_yearly_ndvi<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        range: YearRange,
    ) -> VegResult<NdviSeries>
    where
        S: GeoDataSource + Sync,
    {
        self.compute_yearly_ndvi_with_cancel(source, aoi, range, &CancelToken::new())
    }

    /// Same as [`compute_yearly_ndvi`](Self::compute_yearly_ndvi) but
    /// abortable through a shared token
    pub fn compute_yearly_ndvi_with_cancel<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        range: YearRange,
        cancel: &CancelToken,
    ) -> VegResult<NdviSeries>
    where
        S: GeoDataSource + Sync,
    {
        self.validate_range(&range)?;
        if cancel.is_cancelled() {
            return Err(VegError::Cancelled);
        }

        log::info!(
            "Aggregating {} {} over ~{:.1} km2 AOI for {}",
            self.params.product.code,
            self.params.product.band,
            aoi.approx_area_km2(),
            range
        );
        log::debug!(
            "Sampling at {} m, model '{}', {:?} retries, {:?} on exhaustion",
            self.params.resolution_m,
            self.model.name(),
            self.params.retry.max_attempts,
            self.params.failure_policy
        );

        let years: Vec<i32> = range.years().collect();
        let values = self.reduce_years(source, aoi, &years, cancel)?;

        let mut records = Vec::with_capacity(values.len());
        for (year, value) in values {
            let raw = match value {
                Some(raw) => raw,
                None => continue,
            };
            let ndvi = raw / self.params.product.scale_factor;
            let estimate = self.model.estimate(ndvi);
            records.push(YearlyRecord {
                year,
                ndvi_raw: raw,
                ndvi_normalized: ndvi,
                biomass: estimate.biomass,
                carbon: estimate.carbon,
                co2: estimate.co2,
            });
        }

        if records.is_empty() {
            log::warn!("No usable observations for any year in {}", range);
        } else {
            log::info!(
                "Aggregation complete: {}/{} years with data",
                records.len(),
                years.len()
            );
        }

        Ok(NdviSeries { range, records })
    }

    /// Mean composite raster of one calendar year, for map display
    ///
    /// `Ok(None)` means the source holds no imagery for that year over
    /// the AOI.
    pub fn year_composite<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        year: i32,
    ) -> VegResult<Option<S::Raster>>
    where
        S: GeoDataSource,
    {
        self.validate_year(year)?;
        let window = TemporalWindow::calendar_year(year)?;
        let cancel = CancelToken::new();
        self.with_retry(&cancel, year, "mean composite", || {
            source.mean_composite(aoi, &window, &self.params.product.band)
        })
    }

    fn validate_range(&self, range: &YearRange) -> VegResult<()> {
        range.validate()?;
        self.validate_year(range.start)?;
        self.validate_year(range.end)
    }

    fn validate_year(&self, year: i32) -> VegResult<()> {
        let product = &self.params.product;
        if !product.covers(year) {
            return Err(VegError::InvalidRange(format!(
                "Year {} is outside {} coverage ({}..={})",
                year,
                product.code,
                product.first_year,
                DataProduct::last_complete_year()
            )));
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn reduce_years<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        years: &[i32],
        cancel: &CancelToken,
    ) -> VegResult<Vec<(i32, Option<f64>)>>
    where
        S: GeoDataSource + Sync,
    {
        use rayon::prelude::*;

        years
            .par_iter()
            .map(|&year| {
                self.year_value(source, aoi, year, cancel)
                    .map(|value| (year, value))
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn reduce_years<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        years: &[i32],
        cancel: &CancelToken,
    ) -> VegResult<Vec<(i32, Option<f64>)>>
    where
        S: GeoDataSource + Sync,
    {
        years
            .iter()
            .map(|&year| {
                self.year_value(source, aoi, year, cancel)
                    .map(|value| (year, value))
            })
            .collect()
    }

    /// One year's reduction with the failure policy applied
    fn year_value<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        year: i32,
        cancel: &CancelToken,
    ) -> VegResult<Option<f64>>
    where
        S: GeoDataSource,
    {
        if cancel.is_cancelled() {
            return Err(VegError::Cancelled);
        }
        match self.reduce_year(source, aoi, year, cancel) {
            Ok(value) => Ok(value),
            Err(err)
                if err.is_transient() && self.params.failure_policy == FailurePolicy::SkipYear =>
            {
                log::warn!(
                    "Year {} dropped after {} attempts: {}",
                    year,
                    self.params.retry.max_attempts,
                    err
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn reduce_year<S>(
        &self,
        source: &S,
        aoi: &AreaOfInterest,
        year: i32,
        cancel: &CancelToken,
    ) -> VegResult<Option<f64>>
    where
        S: GeoDataSource,
    {
        let window = TemporalWindow::calendar_year(year)?;

        let composite = self.with_retry(cancel, year, "mean composite", || {
            source.mean_composite(aoi, &window, &self.params.product.band)
        })?;
        let raster = match composite {
            Some(raster) => raster,
            None => {
                log::debug!("Year {}: no imagery in window, omitting", year);
                return Ok(None);
            }
        };

        let mean = self.with_retry(cancel, year, "spatial mean", || {
            source.spatial_mean(&raster, aoi, self.params.resolution_m)
        })?;
        if mean.is_none() {
            log::debug!("Year {}: reduction undefined over the AOI, omitting", year);
        }
        Ok(mean)
    }

    /// Run a source call, retrying transient failures with backoff
    ///
    /// Non-transient errors and `Ok(None)` return immediately.
    fn with_retry<T>(
        &self,
        cancel: &CancelToken,
        year: i32,
        what: &str,
        mut op: impl FnMut() -> VegResult<T>,
    ) -> VegResult<T> {
        let policy = &self.params.retry;
        let mut last_error: Option<VegError> = None;

        for attempt in 1..=policy.max_attempts.max(1) {
            if cancel.is_cancelled() {
                return Err(VegError::Cancelled);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    log::warn!(
                        "Year {}: {} failed on attempt {}/{}: {}",
                        year,
                        what,
                        attempt,
                        policy.max_attempts,
                        err
                    );
                    last_error = Some(err);
                    if attempt < policy.max_attempts {
                        let pause = policy.backoff(attempt);
                        log::debug!("Retrying in {:.1} s", pause.as_secs_f64());
                        std::thread::sleep(pause);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VegError::SourceUnavailable(format!("year {}: {} failed without a response", year, what))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Source that answers every composite with one constant raw value
    struct ConstSource {
        value: f64,
    }

    impl GeoDataSource for ConstSource {
        type Raster = f64;

        fn mean_composite(
            &self,
            _aoi: &AreaOfInterest,
            _window: &TemporalWindow,
            _band: &str,
        ) -> VegResult<Option<f64>> {
            Ok(Some(self.value))
        }

        fn spatial_mean(
            &self,
            raster: &f64,
            _aoi: &AreaOfInterest,
            _resolution_m: f64,
        ) -> VegResult<Option<f64>> {
            Ok(Some(*raster))
        }
    }

    fn small_aoi() -> AreaOfInterest {
        AreaOfInterest::from_rect(10.0, 50.0, 10.1, 50.1).unwrap()
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff(1), Duration::ZERO);
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_default_params() {
        let params = AggregationParams::default();
        assert_eq!(params.product.code, "MOD13Q1");
        assert_eq!(params.resolution_m, 250.0);
        assert_eq!(params.failure_policy, FailurePolicy::SkipYear);
    }

    #[test]
    fn test_compute_constant_source() {
        let aggregator = NdviAggregator::new();
        let source = ConstSource { value: 6_200.0 };
        let series = aggregator
            .compute_yearly_ndvi(&source, &small_aoi(), YearRange::new(2015, 2017).unwrap())
            .unwrap();

        assert_eq!(series.years(), vec![2015, 2016, 2017]);
        for record in &series.records {
            assert_relative_eq!(record.ndvi_normalized, 0.62, epsilon = 1e-12);
            assert_relative_eq!(record.biomass, 10_000.0 * 0.62, epsilon = 1e-9);
            assert_relative_eq!(record.carbon, 0.5 * record.biomass, epsilon = 1e-9);
            assert_relative_eq!(record.co2, 3.67 * record.carbon, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_reversed_range_rejected() {
        let aggregator = NdviAggregator::new();
        let source = ConstSource { value: 5_000.0 };
        let range = YearRange {
            start: 2017,
            end: 2015,
        };
        let result = aggregator.compute_yearly_ndvi(&source, &small_aoi(), range);
        assert!(matches!(result, Err(VegError::InvalidRange(_))));
    }

    #[test]
    fn test_range_outside_coverage_rejected() {
        let aggregator = NdviAggregator::new();
        let source = ConstSource { value: 5_000.0 };

        let too_early = YearRange::new(1999, 2001).unwrap();
        assert!(matches!(
            aggregator.compute_yearly_ndvi(&source, &small_aoi(), too_early),
            Err(VegError::InvalidRange(_))
        ));

        let current = DataProduct::last_complete_year() + 1;
        let too_late = YearRange::new(current, current).unwrap();
        assert!(matches!(
            aggregator.compute_yearly_ndvi(&source, &small_aoi(), too_late),
            Err(VegError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_pre_cancelled_token() {
        let aggregator = NdviAggregator::new();
        let source = ConstSource { value: 5_000.0 };
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = aggregator.compute_yearly_ndvi_with_cancel(
            &source,
            &small_aoi(),
            YearRange::new(2015, 2017).unwrap(),
            &cancel,
        );
        assert!(matches!(result, Err(VegError::Cancelled)));
    }

    #[test]
    fn test_year_composite_validates_coverage() {
        let aggregator = NdviAggregator::new();
        let source = ConstSource { value: 5_000.0 };
        assert!(matches!(
            aggregator.year_composite(&source, &small_aoi(), 1999),
            Err(VegError::InvalidRange(_))
        ));
        let raster = aggregator
            .year_composite(&source, &small_aoi(), 2016)
            .unwrap();
        assert_eq!(raster, Some(5_000.0));
    }
}
