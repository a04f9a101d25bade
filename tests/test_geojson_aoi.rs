use std::io::Write;

use chrono::NaiveDate;
use ndarray::Array2;
use tempfile::NamedTempFile;
use verdine::io::GridGeometry;
use verdine::{
    aoi_from_geojson, aoi_from_geojson_file, MemorySource, NdviAggregator, VegError, YearRange,
};

/// The shape a leaflet-style draw widget exports: a FeatureCollection with
/// one drawing per feature
const DRAW_EXPORT: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": {"shape": "marker"},
            "geometry": {"type": "Point", "coordinates": [85.8245, 20.2961]}
        },
        {
            "type": "Feature",
            "properties": {"shape": "rectangle"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [85.40, 20.40],
                    [85.49, 20.40],
                    [85.49, 20.49],
                    [85.40, 20.49],
                    [85.40, 20.40]
                ]]
            }
        }
    ]
}"#;

#[test]
fn test_first_polygonal_drawing_becomes_the_aoi() {
    let aoi = aoi_from_geojson(DRAW_EXPORT).unwrap();
    let bbox = aoi.bounding_box();
    assert!((bbox.min_lon - 85.40).abs() < 1e-12);
    assert!((bbox.max_lat - 20.49).abs() < 1e-12);
    assert!(aoi.contains(85.45, 20.45));
    assert!(!aoi.contains(85.8245, 20.2961));
}

#[test]
fn test_exported_file_round_trip() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(DRAW_EXPORT.as_bytes()).unwrap();
    file.flush().unwrap();

    let aoi = aoi_from_geojson_file(file.path()).unwrap();
    assert!(aoi.contains(85.45, 20.45));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let err = aoi_from_geojson_file("/nonexistent/aoi.geojson").unwrap_err();
    assert!(matches!(err, VegError::Io(_)));
}

#[test]
fn test_multipolygon_feature() {
    let text = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "MultiPolygon",
            "coordinates": [
                [[[85.0, 20.0], [85.1, 20.0], [85.1, 20.1], [85.0, 20.1], [85.0, 20.0]]],
                [[[85.3, 20.3], [85.4, 20.3], [85.4, 20.4], [85.3, 20.4], [85.3, 20.3]]]
            ]
        }
    }"#;
    let aoi = aoi_from_geojson(text).unwrap();
    assert_eq!(aoi.geometry().0.len(), 2);
    assert!(aoi.contains(85.05, 20.05));
    assert!(aoi.contains(85.35, 20.35));
    assert!(!aoi.contains(85.2, 20.2));
}

#[test]
fn test_self_intersecting_drawing_is_rejected() {
    let text = r#"{
        "type": "Polygon",
        "coordinates": [[
            [85.0, 20.0], [85.1, 20.1], [85.1, 20.0], [85.0, 20.1], [85.0, 20.0]
        ]]
    }"#;
    let err = aoi_from_geojson(text).unwrap_err();
    assert!(matches!(err, VegError::InvalidGeometry(_)));
}

#[test]
fn test_exported_aoi_feeds_the_aggregator() {
    let aoi = aoi_from_geojson(DRAW_EXPORT).unwrap();

    let mut source = MemorySource::new(
        "NDVI",
        GridGeometry {
            origin_lon: 85.0,
            origin_lat: 21.0,
            pixel_width: 0.01,
            pixel_height: 0.01,
        },
    );
    source
        .add_scene(
            NaiveDate::from_ymd_opt(2018, 6, 1).unwrap(),
            Array2::from_elem((100, 100), 7_200.0),
        )
        .unwrap();

    let series = NdviAggregator::new()
        .compute_yearly_ndvi(&source, &aoi, YearRange::new(2018, 2018).unwrap())
        .unwrap();
    assert_eq!(series.years(), vec![2018]);
    assert!((series.get(2018).unwrap().ndvi_normalized - 0.72).abs() < 1e-9);
}
