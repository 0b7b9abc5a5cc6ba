//! ESRI Shapefile geometry (`.shp`) reader.
//!
//! The 100 byte file header mixes byte orders: file code and length are
//! big-endian, everything from the version on is little-endian. Records have
//! a big-endian 8 byte header followed by little-endian content.

use crate::bounds::Extent;
use crate::cursor::{ByteCursor, Endian};
use crate::error::FormatError;
use log::{debug, warn};
use std::fmt;

pub const FILE_CODE: i32 = 9994;
pub const SHAPEFILE_VERSION: i32 = 1000;
pub const HEADER_SIZE: usize = 100;
/// Header size in 16-bit words
pub const HEADER_WORDS: u32 = (HEADER_SIZE / 2) as u32;

/// Geometry type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
    PointZ,
    PolyLineZ,
    PolygonZ,
    MultiPointZ,
    PointM,
    PolyLineM,
    PolygonM,
    MultiPointM,
    MultiPatch,
    Unknown(i32),
}

impl From<i32> for ShapeType {
    fn from(value: i32) -> Self {
        match value {
            0 => ShapeType::Null,
            1 => ShapeType::Point,
            3 => ShapeType::PolyLine,
            5 => ShapeType::Polygon,
            8 => ShapeType::MultiPoint,
            11 => ShapeType::PointZ,
            13 => ShapeType::PolyLineZ,
            15 => ShapeType::PolygonZ,
            18 => ShapeType::MultiPointZ,
            21 => ShapeType::PointM,
            23 => ShapeType::PolyLineM,
            25 => ShapeType::PolygonM,
            28 => ShapeType::MultiPointM,
            31 => ShapeType::MultiPatch,
            other => ShapeType::Unknown(other),
        }
    }
}

impl ShapeType {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeType::Null => "Null",
            ShapeType::Point => "Point",
            ShapeType::PolyLine => "Polyline",
            ShapeType::Polygon => "Polygon",
            ShapeType::MultiPoint => "Multipoint",
            ShapeType::PointZ => "PointZ",
            ShapeType::PolyLineZ => "PolylineZ",
            ShapeType::PolygonZ => "PolygonZ",
            ShapeType::MultiPointZ => "MultipointZ",
            ShapeType::PointM => "PointM",
            ShapeType::PolyLineM => "PolylineM",
            ShapeType::PolygonM => "PolygonM",
            ShapeType::MultiPointM => "MultipointM",
            ShapeType::MultiPatch => "MultiPatch",
            ShapeType::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeType::Unknown(v) => write!(f, "Unknown ({v})"),
            other => f.write_str(other.name()),
        }
    }
}

/// 100 byte header shared by `.shp` and `.shx` files.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapefileHeader {
    /// File length in 16-bit words
    pub file_length: i32,
    pub version: i32,
    pub shape_type: ShapeType,
    pub bbox: Extent,
}

impl ShapefileHeader {
    /// Reads the header and leaves the cursor at byte 100, big-endian.
    pub fn read_from(cursor: &mut ByteCursor<'_>, format: &'static str) -> Result<Self, FormatError> {
        cursor.set_order(Endian::Big);
        let code = cursor.read_i32()?;
        if code != FILE_CODE {
            return Err(FormatError::BadMagic {
                format,
                expected: FILE_CODE as u32,
                found: code as u32,
            });
        }
        cursor.skip(20)?;
        let file_length = cursor.read_i32()?;

        cursor.set_order(Endian::Little);
        let version = cursor.read_i32()?;
        if version != SHAPEFILE_VERSION {
            warn!("unexpected {format} version {version}");
        }
        let shape_type = ShapeType::from(cursor.read_i32()?);
        let bbox = Extent::new(
            cursor.read_f64()?,
            cursor.read_f64()?,
            cursor.read_f64()?,
            cursor.read_f64()?,
        );
        // z and m ranges
        cursor.seek(HEADER_SIZE)?;
        cursor.set_order(Endian::Big);

        debug!(
            "{format} header: {shape_type}, length {file_length} words, bbox [{}, {}, {}, {}]",
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
        );
        Ok(ShapefileHeader {
            file_length,
            version,
            shape_type,
            bbox,
        })
    }
}

/// Polygon geometry.
///
/// The first ring is the outer boundary, later rings are usually holes.
#[derive(Clone, Debug, PartialEq)]
pub struct PolygonRecord {
    pub record_number: i32,
    pub bbox: Extent,
    pub rings: Vec<Vec<[f64; 2]>>,
}

impl PolygonRecord {
    pub fn outer_ring(&self) -> Option<&[[f64; 2]]> {
        self.rings.first().map(Vec::as_slice)
    }

    pub fn point_count(&self) -> usize {
        self.rings.iter().map(Vec::len).sum()
    }

    fn read_from(cursor: &mut ByteCursor<'_>, record_number: i32) -> Result<Self, FormatError> {
        let bbox = Extent::new(
            cursor.read_f64()?,
            cursor.read_f64()?,
            cursor.read_f64()?,
            cursor.read_f64()?,
        );
        let num_parts = read_count(cursor, record_number, "part count")?;
        let num_points = read_count(cursor, record_number, "point count")?;

        let mut parts = Vec::with_capacity(num_parts.min(cursor.remaining() / 4));
        for _ in 0..num_parts {
            parts.push(read_count(cursor, record_number, "part index")?);
        }
        let mut points = Vec::with_capacity(num_points.min(cursor.remaining() / 16));
        for _ in 0..num_points {
            points.push([cursor.read_f64()?, cursor.read_f64()?]);
        }

        let mut rings = Vec::with_capacity(parts.len());
        for (i, &start) in parts.iter().enumerate() {
            let end = parts.get(i + 1).copied().unwrap_or(num_points);
            let ring = points.get(start..end).ok_or_else(|| FormatError::InvalidRecord {
                index: record_number.max(0) as usize,
                reason: format!("part {i} spans {start}..{end} of {num_points} points"),
            })?;
            rings.push(ring.to_vec());
        }

        Ok(PolygonRecord {
            record_number,
            bbox,
            rings,
        })
    }
}

fn read_count(cursor: &mut ByteCursor<'_>, record: i32, what: &str) -> Result<usize, FormatError> {
    let value = cursor.read_i32()?;
    usize::try_from(value).map_err(|_| FormatError::InvalidRecord {
        index: record.max(0) as usize,
        reason: format!("negative {what} {value}"),
    })
}

/// Decoded geometry file
#[derive(Clone, Debug)]
pub struct Shapefile {
    pub header: ShapefileHeader,
    pub polygons: Vec<PolygonRecord>,
    /// Records of other shape types, skipped by content length
    pub skipped_records: usize,
    pub null_records: usize,
    /// Decoding stopped early on a malformed record
    pub truncated: bool,
}

impl Shapefile {
    pub fn shape_type(&self) -> ShapeType {
        self.header.shape_type
    }

    pub fn bbox(&self) -> Extent {
        self.header.bbox
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

enum Record {
    Null,
    Polygon(PolygonRecord),
    Skipped,
}

fn read_record(cursor: &mut ByteCursor<'_>) -> Result<Record, FormatError> {
    let record_number = cursor.read_i32_as(Endian::Big)?;
    let content_length = cursor.read_i32_as(Endian::Big)?;
    let content_start = cursor.position();

    cursor.set_order(Endian::Little);
    let shape_type = ShapeType::from(cursor.read_i32()?);
    match shape_type {
        ShapeType::Null => {
            debug!("skipping null shape in record {record_number}");
            Ok(Record::Null)
        }
        ShapeType::Polygon => Ok(Record::Polygon(PolygonRecord::read_from(
            cursor,
            record_number,
        )?)),
        other => {
            warn!("skipping unsupported shape type {other} in record {record_number}");
            let length = usize::try_from(content_length).map_err(|_| FormatError::InvalidRecord {
                index: record_number.max(0) as usize,
                reason: format!("negative content length {content_length}"),
            })?;
            cursor.seek(content_start + length * 2)?;
            Ok(Record::Skipped)
        }
    }
}

/// Decodes a `.shp` file held in memory.
///
/// Only polygon records are decoded. A malformed record ends decoding and
/// keeps the polygons read so far; a bad file code fails the whole call.
pub fn read_shp(data: &[u8]) -> Result<Shapefile, FormatError> {
    let mut cursor = ByteCursor::new(data);
    let header = ShapefileHeader::read_from(&mut cursor, "shp")?;

    let mut shapefile = Shapefile {
        header,
        polygons: Vec::new(),
        skipped_records: 0,
        null_records: 0,
        truncated: false,
    };

    let mut count = 0;
    while cursor.remaining() > 8 {
        match read_record(&mut cursor) {
            Ok(Record::Polygon(polygon)) => shapefile.polygons.push(polygon),
            Ok(Record::Null) => shapefile.null_records += 1,
            Ok(Record::Skipped) => shapefile.skipped_records += 1,
            Err(e) => {
                warn!("error reading record {count}: {e}");
                shapefile.truncated = true;
                break;
            }
        }
        count += 1;
    }

    debug!("loaded {} polygon records", shapefile.polygons.len());
    Ok(shapefile)
}
