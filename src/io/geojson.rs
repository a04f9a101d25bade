//! AOI extraction from GeoJSON documents
//!
//! Map-draw tools export the user's drawings as a GeoJSON
//! FeatureCollection. The first polygonal geometry in the document becomes
//! the area of interest; markers, lines and other non-polygonal drawings
//! are skipped. Bare Feature and bare geometry documents are accepted too.

use std::path::Path;

use geo_types::{LineString, MultiPolygon, Polygon};
use serde::Deserialize;

use crate::core::geometry::AreaOfInterest;
use crate::types::{VegError, VegResult};

/// GeoJSON ring: positions of 2 or more ordinates (extra ordinates such as
/// altitude are ignored)
type Ring = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Document {
    FeatureCollection { features: Vec<Feature> },
    Feature { geometry: Option<Geometry> },
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

/// Extract and validate the AOI from a GeoJSON string
///
/// Accepts a FeatureCollection (the shape a map-draw export produces), a
/// bare Feature, or a bare Polygon/MultiPolygon geometry. The first
/// polygonal geometry wins; a document with none is `InvalidGeometry`.
pub fn aoi_from_geojson(text: &str) -> VegResult<AreaOfInterest> {
    let document: Document = serde_json::from_str(text)?;
    let geometry = match document {
        Document::Polygon { coordinates } => Some(polygon_from_rings(&coordinates)?),
        Document::MultiPolygon { coordinates } => Some(multi_from_rings(&coordinates)?),
        Document::Feature { geometry } => polygonal(geometry)?,
        Document::FeatureCollection { features } => {
            let mut found = None;
            for feature in features {
                if let Some(geometry) = polygonal(feature.geometry)? {
                    found = Some(geometry);
                    break;
                }
            }
            found
        }
        Document::Other => None,
    };
    let geometry = geometry.ok_or_else(|| {
        VegError::InvalidGeometry("Document contains no polygonal geometry".to_string())
    })?;
    AreaOfInterest::from_multi_polygon(geometry)
}

/// Extract and validate the AOI from a GeoJSON file (e.g. `aoi.geojson`
/// exported by a map-draw widget)
pub fn aoi_from_geojson_file(path: impl AsRef<Path>) -> VegResult<AreaOfInterest> {
    let path = path.as_ref();
    log::debug!("Reading AOI from {}", path.display());
    let text = std::fs::read_to_string(path)?;
    aoi_from_geojson(&text)
}

fn polygonal(geometry: Option<Geometry>) -> VegResult<Option<MultiPolygon<f64>>> {
    match geometry {
        Some(Geometry::Polygon { coordinates }) => Ok(Some(polygon_from_rings(&coordinates)?)),
        Some(Geometry::MultiPolygon { coordinates }) => Ok(Some(multi_from_rings(&coordinates)?)),
        Some(Geometry::Other) | None => Ok(None),
    }
}

fn polygon_from_rings(rings: &[Ring]) -> VegResult<MultiPolygon<f64>> {
    Ok(MultiPolygon(vec![build_polygon(rings)?]))
}

fn multi_from_rings(polygons: &[Vec<Ring>]) -> VegResult<MultiPolygon<f64>> {
    let mut built = Vec::with_capacity(polygons.len());
    for rings in polygons {
        built.push(build_polygon(rings)?);
    }
    Ok(MultiPolygon(built))
}

fn build_polygon(rings: &[Ring]) -> VegResult<Polygon<f64>> {
    let mut iter = rings.iter();
    let exterior = iter.next().ok_or_else(|| {
        VegError::InvalidFormat("Polygon geometry carries no rings".to_string())
    })?;
    let exterior = line_string(exterior)?;
    let holes = iter.map(|ring| line_string(ring)).collect::<VegResult<Vec<_>>>()?;
    Ok(Polygon::new(exterior, holes))
}

fn line_string(ring: &Ring) -> VegResult<LineString<f64>> {
    let mut coords = Vec::with_capacity(ring.len());
    for position in ring {
        if position.len() < 2 {
            return Err(VegError::InvalidFormat(format!(
                "Position carries {} ordinate(s), at least lon/lat required",
                position.len()
            )));
        }
        coords.push((position[0], position[1]));
    }
    Ok(LineString::from(coords))
}
