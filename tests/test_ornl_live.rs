//! Live smoke test against the ORNL DAAC MODIS subset service
//!
//! Opt in with `VERDINE_LIVE_TESTS=1 cargo test --test test_ornl_live`;
//! without the variable the test prints a notice and passes, so offline and
//! CI runs stay green.

use verdine::{AreaOfInterest, GeoDataSource, NdviAggregator, OrnlSource, TemporalWindow, YearRange};

fn live_tests_enabled() -> bool {
    std::env::var("VERDINE_LIVE_TESTS").map_or(false, |v| v == "1")
}

#[test]
fn test_live_single_year_subset() {
    let _ = env_logger::builder().is_test(true).try_init();
    if !live_tests_enabled() {
        println!("VERDINE_LIVE_TESTS not set, skipping live subset test");
        return;
    }

    // ~2 km square over dense forest near Bhubaneswar, India
    let aoi = AreaOfInterest::from_rect(85.80, 20.28, 85.82, 20.30).unwrap();
    let source = OrnlSource::new().expect("Failed to build the subset client");

    let window = TemporalWindow::calendar_year(2018).unwrap();
    match source.mean_composite(&aoi, &window, "NDVI") {
        Ok(Some(composite)) => {
            println!(
                "Composite grid: {:?}, cellsize {:.2} m",
                composite.grid().dim(),
                composite.cellsize()
            );
            let mean = source
                .spatial_mean(&composite, &aoi, 250.0)
                .expect("Spatial reduction failed");
            println!("2018 mean raw NDVI: {:?}", mean);
            let mean = mean.expect("Expected valid pixels over land");
            assert!(mean > 0.0 && mean <= 10_000.0);
        }
        Ok(None) => panic!("Service served no 2018 composites for a land AOI"),
        Err(e) => {
            // Outages happen; report rather than fail the suite
            println!("Live service unavailable: {}", e);
        }
    }
}

#[test]
fn test_live_yearly_aggregation() {
    if !live_tests_enabled() {
        println!("VERDINE_LIVE_TESTS not set, skipping live aggregation test");
        return;
    }

    let aoi = AreaOfInterest::from_rect(85.80, 20.28, 85.82, 20.30).unwrap();
    let source = OrnlSource::new().expect("Failed to build the subset client");
    let aggregator = NdviAggregator::new();

    match aggregator.compute_yearly_ndvi(&source, &aoi, YearRange::new(2017, 2018).unwrap()) {
        Ok(series) => {
            println!("Years with data: {:?}", series.years());
            for record in &series.records {
                println!(
                    "  {}: NDVI {:.3}, biomass {:.0}, CO2 {:.0}",
                    record.year, record.ndvi_normalized, record.biomass, record.co2
                );
                assert!(record.ndvi_normalized >= -1.0 && record.ndvi_normalized <= 1.0);
            }
        }
        Err(e) => println!("Live aggregation unavailable: {}", e),
    }
}
