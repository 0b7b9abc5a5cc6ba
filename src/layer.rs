//! Extruded building footprints assembled from a Shapefile set.

use crate::assets::AssetProvider;
use crate::bounds::Extent;
use crate::dbf::{read_dbf, AttributeRecord, AttributeTable, Value};
use crate::error::{Error, FormatError, Result};
use crate::prj::Projection;
use crate::shp::{read_shp, Shapefile};
use crate::shx::{read_shx, SpatialIndex};
use log::{debug, info, warn};

pub const MAX_HEIGHT: f64 = 10_000.0;
pub const MAX_FLOORS: i64 = 200;
pub const FLOOR_HEIGHT: f64 = 3.0;
pub const FOOTPRINT_ALPHA: f32 = 0.6;

const HEIGHT_FIELDS: [&str; 8] = [
    "height",
    "HEIGHT",
    "elevation",
    "ELEVATION",
    "elev",
    "ELEV",
    "alt",
    "ALT",
];
const FLOOR_FIELDS: [&str; 6] = ["floors", "FLOORS", "floor", "FLOOR", "storeys", "STOREYS"];
const NAME_FIELDS: [&str; 5] = ["NAME", "BUILDINGNA", "BUILDING", "LABEL", "ID"];

/// Building height in meters from the attribute record.
///
/// Explicit height fields come first, then the floor count at
/// [`FLOOR_HEIGHT`] per floor. Defaults to 0.
pub fn extract_height(record: &AttributeRecord) -> f64 {
    for field in HEIGHT_FIELDS {
        let height = match record.get(field) {
            Some(Value::Text(text)) => match text.trim().parse::<f64>() {
                Ok(h) => h,
                Err(_) => {
                    warn!("failed to parse height {text:?} from field {field}");
                    continue;
                }
            },
            Some(value) => match value.as_f64() {
                Some(h) => h,
                None => continue,
            },
            None => continue,
        };
        if (0.0..=MAX_HEIGHT).contains(&height) {
            return height;
        }
        warn!("invalid height {height} from field {field}");
    }

    for field in FLOOR_FIELDS {
        let floors = record
            .get(field)
            .and_then(Value::as_f64)
            .map(|f| f.trunc() as i64);
        if let Some(floors @ 1..=MAX_FLOORS) = floors {
            return floors as f64 * FLOOR_HEIGHT;
        }
    }
    0.0
}

/// First non-empty name-like attribute.
pub fn display_name(record: &AttributeRecord) -> Option<String> {
    NAME_FIELDS.iter().find_map(|field| {
        let value = record.get(field)?;
        let text = value.to_string();
        (!value.is_null() && !text.is_empty()).then_some(text)
    })
}

/// RGBA heat ramp by height.
pub fn height_color(height: f64) -> [f32; 4] {
    let [r, g, b] = if height < 10.0 {
        [0.5, 0.7, 1.0]
    } else if height < 30.0 {
        [0.3, 0.8, 0.3]
    } else if height < 60.0 {
        [1.0, 0.9, 0.3]
    } else if height < 100.0 {
        [1.0, 0.6, 0.2]
    } else {
        [1.0, 0.3, 0.2]
    };
    [r, g, b, FOOTPRINT_ALPHA]
}

/// One polygon record ready for extrusion.
#[derive(Clone, Debug, PartialEq)]
pub struct Building {
    pub record_number: i32,
    /// Every ring of the polygon, the outer boundary first.
    /// Inner rings are not treated as holes.
    pub footprints: Vec<Vec<[f64; 2]>>,
    pub height: f64,
    pub name: Option<String>,
    pub color: [f32; 4],
}

impl Building {
    pub fn outer_ring(&self) -> &[[f64; 2]] {
        self.footprints.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Height statistics over buildings with a positive height
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeightStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

impl HeightStats {
    fn add(&mut self, height: f64) {
        if self.count == 0 {
            self.min = height;
            self.max = height;
        } else {
            self.min = self.min.min(height);
            self.max = self.max.max(height);
        }
        self.count += 1;
        self.total += height;
    }

    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BuildingLayer {
    pub buildings: Vec<Building>,
    pub heights: HeightStats,
    /// `(index records, buildings)` when the index disagrees
    pub index_mismatch: Option<(usize, usize)>,
}

impl BuildingLayer {
    /// Joins polygon `i` with attribute record `i`.
    pub fn assemble(
        shapefile: &Shapefile,
        attributes: Option<&AttributeTable>,
        index: Option<&SpatialIndex>,
    ) -> BuildingLayer {
        let mut layer = BuildingLayer::default();
        for (i, polygon) in shapefile.polygons.iter().enumerate() {
            if polygon.rings.is_empty() {
                debug!("record {} has no rings", polygon.record_number);
                continue;
            }
            let record = attributes.and_then(|table| table.get(i));
            let height = record.map(extract_height).unwrap_or(0.0);
            if height > 0.0 {
                layer.heights.add(height);
            }
            layer.buildings.push(Building {
                record_number: polygon.record_number,
                footprints: polygon.rings.clone(),
                height,
                name: record.and_then(display_name),
                color: height_color(height),
            });
        }

        if let Some(index) = index {
            layer.index_mismatch = index.count_mismatch(layer.buildings.len());
            if let Some((records, buildings)) = layer.index_mismatch {
                warn!("index record count ({records}) does not match loaded polygons ({buildings})");
            }
        }
        info!("assembled {} buildings", layer.buildings.len());
        layer
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Bounds of every ring point; x is longitude, y latitude.
    pub fn extent(&self) -> Extent {
        let mut extent = Extent::default();
        for point in self
            .buildings
            .iter()
            .flat_map(|b| b.footprints.iter().flatten())
        {
            extent.expand_xy(point[0], point[1]);
        }
        extent
    }

    /// The extent fits WGS 84 degrees and spans at most 180 degrees.
    pub fn has_valid_geographic_extent(&self) -> bool {
        let extent = self.extent();
        if extent.is_empty() {
            warn!("no coordinates loaded");
            return false;
        }
        if extent.min_y < -90.0 || extent.max_y > 90.0 {
            warn!("invalid latitude range [{}, {}]", extent.min_y, extent.max_y);
            return false;
        }
        if extent.min_x < -180.0 || extent.max_x > 180.0 {
            warn!("invalid longitude range [{}, {}]", extent.min_x, extent.max_x);
            return false;
        }
        let span = (extent.max_y - extent.min_y).max(extent.max_x - extent.min_x);
        if span > 180.0 {
            warn!("coordinate span {span} > 180 degrees, likely projected");
            return false;
        }
        true
    }

    /// Camera range in meters that frames the whole layer.
    pub fn view_range(&self) -> Option<f64> {
        let extent = self.extent();
        if extent.is_empty() {
            return None;
        }
        let span = (extent.max_y - extent.min_y).max(extent.max_x - extent.min_x);
        Some((span * 111_000.0 * 1.5).clamp(1000.0, 500_000.0))
    }
}

/// The files of one Shapefile dataset.
#[derive(Clone, Debug)]
pub struct ShapefileSet {
    pub shapefile: Shapefile,
    pub attributes: Option<AttributeTable>,
    pub index: Option<SpatialIndex>,
    pub projection: Option<Projection>,
}

impl ShapefileSet {
    /// Reads `<stem>.shp` and whichever of `.dbf`, `.shx` and `.prj` can be read.
    pub fn load(assets: &dyn AssetProvider, stem: &str) -> Result<ShapefileSet> {
        let path = format!("{stem}.shp");
        let bytes = assets.read(&path)?;
        let shapefile = read_shp(&bytes).map_err(|e| Error::decode(&path, "shp", e))?;

        let attributes = optional(assets, stem, "dbf", read_dbf);
        let index = optional(assets, stem, "shx", read_shx);
        let projection = optional(assets, stem, "prj", Projection::read);
        if projection.is_none() {
            warn!("no usable projection for {stem}, assuming WGS 84");
        }

        Ok(ShapefileSet {
            shapefile,
            attributes,
            index,
            projection,
        })
    }

    pub fn building_layer(&self) -> BuildingLayer {
        BuildingLayer::assemble(
            &self.shapefile,
            self.attributes.as_ref(),
            self.index.as_ref(),
        )
    }
}

fn optional<T>(
    assets: &dyn AssetProvider,
    stem: &str,
    extension: &'static str,
    decode: impl FnOnce(&[u8]) -> std::result::Result<T, FormatError>,
) -> Option<T> {
    let path = format!("{stem}.{extension}");
    let result = assets
        .read(&path)
        .and_then(|bytes| decode(&bytes).map_err(|e| Error::decode(&path, extension, e)));
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("skipping {path}: {e}");
            None
        }
    }
}
