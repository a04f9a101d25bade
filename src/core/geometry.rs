use crate::types::{BoundingBox, VegError, VegResult};
use geo_types::{LineString, MultiPolygon, Polygon};

/// Mean Earth radius of the MODIS sinusoidal grid, meters
pub const SINUSOIDAL_EARTH_RADIUS_M: f64 = 6_371_007.181;

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Rings enclosing less planar area than this (squared degrees) are
/// considered degenerate
const MIN_RING_AREA_DEG2: f64 = 1e-12;

/// A validated area of interest in WGS84 longitude/latitude order
///
/// Construction performs the full geometry validation pass, so every
/// `AreaOfInterest` handed to a data source is non-empty, in-bounds,
/// non-degenerate and free of exterior self-intersections.
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    geometry: MultiPolygon<f64>,
    bbox: BoundingBox,
}

impl AreaOfInterest {
    /// Validate a single polygon as the area of interest
    pub fn from_polygon(polygon: Polygon<f64>) -> VegResult<Self> {
        Self::from_multi_polygon(MultiPolygon(vec![polygon]))
    }

    /// Validate a multipolygon as the area of interest
    pub fn from_multi_polygon(geometry: MultiPolygon<f64>) -> VegResult<Self> {
        if geometry.0.is_empty() {
            return Err(VegError::InvalidGeometry(
                "AOI contains no polygons".to_string(),
            ));
        }

        for polygon in &geometry.0 {
            validate_ring(polygon.exterior(), "Exterior")?;
            check_self_intersection(polygon.exterior())?;
            for hole in polygon.interiors() {
                validate_ring(hole, "Interior")?;
            }
        }

        let bbox = multi_polygon_bbox(&geometry);
        let aoi = Self { geometry, bbox };
        log::debug!(
            "Validated AOI: {} polygon(s), ~{:.2} km², bbox {:?}",
            aoi.geometry.0.len(),
            aoi.approx_area_km2(),
            aoi.bbox
        );
        Ok(aoi)
    }

    /// Build an AOI from raw exterior-ring lon/lat pairs
    pub fn from_exterior_coords(coords: &[(f64, f64)]) -> VegResult<Self> {
        let ring = LineString::from(coords.to_vec());
        Self::from_polygon(Polygon::new(ring, vec![]))
    }

    /// Build a rectangular AOI from corner coordinates
    pub fn from_rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> VegResult<Self> {
        Self::from_exterior_coords(&[
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
            (min_lon, min_lat),
        ])
    }

    /// The underlying geometry
    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Bounding box of all rings
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Even-odd point-in-polygon test across all member polygons
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.geometry.0.iter().any(|polygon| {
            let mut inside = ring_parity(polygon.exterior(), lon, lat);
            for hole in polygon.interiors() {
                inside ^= ring_parity(hole, lon, lat);
            }
            inside
        })
    }

    /// A point guaranteed to lie inside the AOI, when one can be found
    /// cheaply (centroid of the first exterior ring)
    pub fn interior_point(&self) -> Option<(f64, f64)> {
        let polygon = self.geometry.0.first()?;
        let pts = closed_ring(polygon.exterior());
        let (lon, lat) = ring_centroid(&pts)?;
        if self.contains(lon, lat) {
            Some((lon, lat))
        } else {
            None
        }
    }

    /// Approximate planar area in square kilometers (small-AOI assumption)
    pub fn approx_area_km2(&self) -> f64 {
        let (_, center_lat) = self.bbox.center();
        let m_per_deg_lon = METERS_PER_DEGREE * center_lat.to_radians().cos();
        let mut area_deg2 = 0.0;
        for polygon in &self.geometry.0 {
            area_deg2 += ring_area_deg2(polygon.exterior());
            for hole in polygon.interiors() {
                area_deg2 -= ring_area_deg2(hole);
            }
        }
        area_deg2.max(0.0) * METERS_PER_DEGREE * m_per_deg_lon / 1.0e6
    }
}

/// Validate one ring: closure-normalized vertex count, finite in-bounds
/// coordinates, non-degenerate area
fn validate_ring(ring: &LineString<f64>, label: &str) -> VegResult<()> {
    let pts = closed_ring(ring);
    let vertex_count = pts.len().saturating_sub(1);
    if vertex_count < 3 {
        return Err(VegError::InvalidGeometry(format!(
            "{} ring has {} vertices, at least 3 required",
            label, vertex_count
        )));
    }

    for &(lon, lat) in &pts {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(VegError::InvalidGeometry(format!(
                "{} ring contains a non-finite coordinate",
                label
            )));
        }
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(VegError::InvalidGeometry(format!(
                "Coordinate ({}, {}) is outside WGS84 bounds",
                lon, lat
            )));
        }
    }

    if ring_area_deg2(ring) <= MIN_RING_AREA_DEG2 {
        return Err(VegError::InvalidGeometry(format!(
            "{} ring encloses no area",
            label
        )));
    }
    Ok(())
}

/// Reject rings whose edges properly cross each other
fn check_self_intersection(ring: &LineString<f64>) -> VegResult<()> {
    let pts = closed_ring(ring);
    let n = pts.len().saturating_sub(1);
    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent edges share an endpoint and never cross properly
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if segments_cross(pts[i], pts[i + 1], pts[j], pts[j + 1]) {
                return Err(VegError::InvalidGeometry(
                    "Exterior ring is self-intersecting".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Strict proper-crossing test for two segments
fn segments_cross(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Z component of the cross product (b - a) × (c - a)
fn cross(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

/// Ring vertices as lon/lat tuples with a guaranteed closing point
fn closed_ring(ring: &LineString<f64>) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = ring.0.iter().map(|c| (c.x, c.y)).collect();
    if let (Some(&first), Some(&last)) = (pts.first(), pts.last()) {
        if first != last {
            pts.push(first);
        }
    }
    pts
}

/// Unsigned shoelace area of a ring, in squared degrees
fn ring_area_deg2(ring: &LineString<f64>) -> f64 {
    let pts = closed_ring(ring);
    let mut doubled = 0.0;
    for w in pts.windows(2) {
        doubled += w[0].0 * w[1].1 - w[1].0 * w[0].1;
    }
    (doubled / 2.0).abs()
}

/// Shoelace centroid of a closed ring
fn ring_centroid(pts: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut doubled = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for w in pts.windows(2) {
        let c = w[0].0 * w[1].1 - w[1].0 * w[0].1;
        doubled += c;
        cx += (w[0].0 + w[1].0) * c;
        cy += (w[0].1 + w[1].1) * c;
    }
    if doubled.abs() < f64::EPSILON {
        return None;
    }
    Some((cx / (3.0 * doubled), cy / (3.0 * doubled)))
}

/// Even-odd crossing parity of a ray cast east from (lon, lat)
fn ring_parity(ring: &LineString<f64>, lon: f64, lat: f64) -> bool {
    let pts = closed_ring(ring);
    let mut inside = false;
    for w in pts.windows(2) {
        let (xi, yi) = w[0];
        let (xj, yj) = w[1];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
    }
    inside
}

fn multi_polygon_bbox(geometry: &MultiPolygon<f64>) -> BoundingBox {
    let mut bbox = BoundingBox {
        min_lon: f64::INFINITY,
        max_lon: f64::NEG_INFINITY,
        min_lat: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
    };
    for polygon in &geometry.0 {
        for c in &polygon.exterior().0 {
            bbox.min_lon = bbox.min_lon.min(c.x);
            bbox.max_lon = bbox.max_lon.max(c.x);
            bbox.min_lat = bbox.min_lat.min(c.y);
            bbox.max_lat = bbox.max_lat.max(c.y);
        }
    }
    bbox
}

/// Convert MODIS sinusoidal grid coordinates (meters) to WGS84 lon/lat
pub fn sinusoidal_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lat_rad = y / SINUSOIDAL_EARTH_RADIUS_M;
    let cos_lat = lat_rad.cos();
    let lon_rad = if cos_lat.abs() < 1e-12 {
        0.0
    } else {
        x / (SINUSOIDAL_EARTH_RADIUS_M * cos_lat)
    };
    (lon_rad.to_degrees(), lat_rad.to_degrees())
}

/// Convert WGS84 lon/lat to MODIS sinusoidal grid coordinates (meters)
pub fn lonlat_to_sinusoidal(lon: f64, lat: f64) -> (f64, f64) {
    let x = SINUSOIDAL_EARTH_RADIUS_M * lon.to_radians() * lat.to_radians().cos();
    let y = SINUSOIDAL_EARTH_RADIUS_M * lat.to_radians();
    (x, y)
}

/// Lattice steps in degrees matching a metric resolution at a latitude
pub fn degree_steps(resolution_m: f64, center_lat: f64) -> (f64, f64) {
    let lat_step = resolution_m / METERS_PER_DEGREE;
    let cos_lat = center_lat.to_radians().cos().max(1e-6);
    let lon_step = resolution_m / (METERS_PER_DEGREE * cos_lat);
    (lon_step, lat_step)
}
