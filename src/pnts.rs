//! Point cloud (`pnts`) tile decoder.
//!
//! Layout (little-endian):
//!   00 : u32  magic = "pnts"
//!   04 : u32  version
//!   08 : u32  byte length of the whole tile
//!   0C : u32  feature table JSON length
//!   10 : u32  feature table binary length
//!   14 : u32  batch table JSON length
//!   18 : u32  batch table binary length
//!   1C : feature table JSON, followed by the feature table binary body

use crate::cursor::ByteCursor;
use crate::error::FormatError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use serde_json::{Map, Value};

/// "pnts" read as a little-endian u32
pub const PNTS_MAGIC: u32 = u32::from_le_bytes(*b"pnts");
pub const PNTS_HEADER_SIZE: usize = 28;
const PNTS_VERSION: u32 = 1;

/// Fixed tile header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PntsHeader {
    pub version: u32,
    pub byte_length: u32,
    pub feature_table_json_byte_length: u32,
    pub feature_table_binary_byte_length: u32,
    pub batch_table_json_byte_length: u32,
    pub batch_table_binary_byte_length: u32,
}

impl PntsHeader {
    /// Reads and checks the 28 byte header.
    pub fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self, FormatError> {
        let magic = cursor.read_u32()?;
        if magic != PNTS_MAGIC {
            return Err(FormatError::BadMagic {
                format: "pnts",
                expected: PNTS_MAGIC,
                found: magic,
            });
        }
        Ok(PntsHeader {
            version: cursor.read_u32()?,
            byte_length: cursor.read_u32()?,
            feature_table_json_byte_length: cursor.read_u32()?,
            feature_table_binary_byte_length: cursor.read_u32()?,
            batch_table_json_byte_length: cursor.read_u32()?,
            batch_table_binary_byte_length: cursor.read_u32()?,
        })
    }
}

/// Decoded point cloud tile.
///
/// `colors` is always RGBA with `4 * point_count` entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloudTile {
    pub header: PntsHeader,
    /// x, y, z per point in the tile frame; empty when the tile has no `POSITION`
    pub positions: Vec<f32>,
    pub colors: Vec<u8>,
    pub normals: Option<Vec<f32>>,
    /// `POINTS_LENGTH` from the feature table
    pub point_count: usize,
    /// `RTC_CENTER`, not applied to `positions`
    pub rtc_center: Option<[f64; 3]>,
}

impl PointCloudTile {
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Position and color of point `i`, if positions were decoded.
    pub fn point(&self, i: usize) -> Option<([f32; 3], [u8; 4])> {
        let p = self.positions.get(i * 3..i * 3 + 3)?;
        let c = self.colors.get(i * 4..i * 4 + 4)?;
        Some(([p[0], p[1], p[2]], [c[0], c[1], c[2], c[3]]))
    }
}

/// Where a feature table property lives in the binary body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Property {
    Absent,
    At(usize),
}

struct FeatureTable(Map<String, Value>);

impl FeatureTable {
    fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let text = std::str::from_utf8(bytes)?;
        // tiles pad the JSON to an 8 byte boundary with spaces, some writers with NULs
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if text.is_empty() {
            return Ok(FeatureTable(Map::new()));
        }
        match serde_json::from_str(text)? {
            Value::Object(map) => Ok(FeatureTable(map)),
            other => Err(FormatError::FeatureTable(format!(
                "expected a JSON object, found {other}"
            ))),
        }
    }

    fn points_length(&self) -> Result<usize, FormatError> {
        match self.0.get("POINTS_LENGTH") {
            None => {
                warn!("feature table has no POINTS_LENGTH, assuming 0 points");
                Ok(0)
            }
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| FormatError::FeatureTable(format!("bad POINTS_LENGTH {v}"))),
        }
    }

    fn property(&self, name: &str) -> Result<Property, FormatError> {
        let Some(value) = self.0.get(name) else {
            return Ok(Property::Absent);
        };
        match value.get("byteOffset") {
            None => Ok(Property::At(0)),
            Some(offset) => offset
                .as_u64()
                .and_then(|o| usize::try_from(o).ok())
                .map(Property::At)
                .ok_or_else(|| {
                    FormatError::FeatureTable(format!("bad byteOffset {offset} for {name}"))
                }),
        }
    }

    fn rtc_center(&self) -> Option<[f64; 3]> {
        let arr = self.0.get("RTC_CENTER")?.as_array()?;
        match arr.as_slice() {
            [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
            _ => None,
        }
    }
}

/// Decodes a complete `pnts` tile held in memory.
pub fn decode_pnts(data: &[u8]) -> Result<PointCloudTile, FormatError> {
    let mut cursor = ByteCursor::new(data);
    let header = PntsHeader::read_from(&mut cursor)?;
    if header.version != PNTS_VERSION {
        warn!("unexpected pnts version {}", header.version);
    }
    debug!(
        "pnts v{} length {} feature table json {} binary {}",
        header.version,
        header.byte_length,
        header.feature_table_json_byte_length,
        header.feature_table_binary_byte_length
    );

    let json = cursor.read_bytes(header.feature_table_json_byte_length as usize)?;
    let table = FeatureTable::parse(json)?;
    let binary_start = cursor.position();

    let n = table.points_length()?;
    let rtc_center = table.rtc_center();

    let positions = match table.property("POSITION")? {
        Property::At(offset) => {
            let bytes = read_array(&mut cursor, binary_start, offset, n, 12, "POSITION")?;
            read_f32s(bytes)
        }
        Property::Absent => {
            warn!("no POSITION in feature table");
            Vec::new()
        }
    };

    let colors = match (table.property("RGBA")?, table.property("RGB")?) {
        (Property::At(offset), _) => {
            read_array(&mut cursor, binary_start, offset, n, 4, "RGBA")?.to_vec()
        }
        (Property::Absent, Property::At(offset)) => {
            let rgb = read_array(&mut cursor, binary_start, offset, n, 3, "RGB")?;
            let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
            for c in rgb.chunks_exact(3) {
                rgba.extend_from_slice(&[c[0], c[1], c[2], 255]);
            }
            rgba
        }
        (Property::Absent, Property::Absent) => {
            // no array backs the count, bound it by the tile size
            if n > data.len() {
                return Err(FormatError::FeatureTable(format!(
                    "POINTS_LENGTH {n} exceeds tile length {}",
                    data.len()
                )));
            }
            vec![255; n * 4]
        }
    };

    let normals = match table.property("NORMAL")? {
        Property::At(offset) => {
            let bytes = read_array(&mut cursor, binary_start, offset, n, 12, "NORMAL")?;
            Some(read_f32s(bytes))
        }
        Property::Absent => None,
    };

    debug!("decoded {n} points");
    Ok(PointCloudTile {
        header,
        positions,
        colors,
        normals,
        point_count: n,
        rtc_center,
    })
}

/// Borrows the `count * size` bytes of `name` at `offset` into the binary body.
fn read_array<'a>(
    cursor: &mut ByteCursor<'a>,
    binary_start: usize,
    offset: usize,
    count: usize,
    size: usize,
    name: &str,
) -> Result<&'a [u8], FormatError> {
    let start = binary_start
        .checked_add(offset)
        .ok_or_else(|| FormatError::FeatureTable(format!("{name} byteOffset {offset} overflows")))?;
    let len = count.checked_mul(size).ok_or_else(|| {
        FormatError::FeatureTable(format!("{name} size overflows for {count} points"))
    })?;
    cursor.seek(start)?;
    Ok(cursor.read_bytes(len)?)
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(LittleEndian::read_f32).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Builds a tile from a feature table JSON and binary body.
    pub(crate) fn build_pnts(json: &str, body: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 8 != 0 {
            json.push(b' ');
        }
        let mut out = Vec::new();
        out.extend_from_slice(b"pnts");
        out.write_u32::<LittleEndian>(1).unwrap();
        out.write_u32::<LittleEndian>((PNTS_HEADER_SIZE + json.len() + body.len()) as u32)
            .unwrap();
        out.write_u32::<LittleEndian>(json.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.extend_from_slice(&json);
        out.extend_from_slice(body);
        out
    }

    fn f32_body(values: &[f32]) -> Vec<u8> {
        let mut body = Vec::new();
        for v in values {
            body.write_f32::<LittleEndian>(*v).unwrap();
        }
        body
    }

    #[test]
    fn positions_and_rgb() {
        let mut body = f32_body(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        body.extend_from_slice(&[10, 20, 30, 40, 50, 60]);
        let json = r#"{"POINTS_LENGTH":2,"POSITION":{"byteOffset":0},"RGB":{"byteOffset":24}}"#;
        let tile = decode_pnts(&build_pnts(json, &body)).unwrap();

        assert_eq!(tile.point_count(), 2);
        assert_eq!(tile.positions, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(tile.colors, vec![10, 20, 30, 255, 40, 50, 60, 255]);
        assert!(tile.normals.is_none());
        assert_eq!(tile.point(1), Some(([4.0, 5.0, 6.0], [40, 50, 60, 255])));
    }

    #[test]
    fn rgba_wins_over_rgb() {
        let mut body = f32_body(&[0.0; 3]);
        body.extend_from_slice(&[1, 2, 3, 4]);
        let json = r#"{"POINTS_LENGTH":1,"POSITION":{},"RGB":{"byteOffset":12},"RGBA":{"byteOffset":12}}"#;
        let tile = decode_pnts(&build_pnts(json, &body)).unwrap();
        assert_eq!(tile.colors, vec![1, 2, 3, 4]);
    }

    #[test]
    fn missing_color_is_opaque_white() {
        let body = f32_body(&[0.0; 9]);
        let json = r#"{"POINTS_LENGTH":3,"POSITION":{"byteOffset":0}}"#;
        let tile = decode_pnts(&build_pnts(json, &body)).unwrap();
        assert_eq!(tile.colors.len(), 12);
        assert!(tile.colors.iter().all(|&c| c == 255));
    }

    #[test]
    fn normals_and_rtc_center() {
        let body = f32_body(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let json = r#"{"POINTS_LENGTH":1,"RTC_CENTER":[1,2,3],"POSITION":{"byteOffset":0},"NORMAL":{"byteOffset":12}}"#;
        let tile = decode_pnts(&build_pnts(json, &body)).unwrap();
        assert_eq!(tile.normals, Some(vec![0.0, 0.0, 1.0]));
        assert_eq!(tile.rtc_center, Some([1.0, 2.0, 3.0]));
        assert_eq!(tile.positions, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn zero_points_without_points_length() {
        let tile = decode_pnts(&build_pnts(r#"{"POSITION":{"byteOffset":0}}"#, &[])).unwrap();
        assert_eq!(tile.point_count(), 0);
        assert!(tile.positions.is_empty());
        assert!(tile.colors.is_empty());
        assert!(tile.normals.is_none());
    }

    #[test]
    fn absent_position_is_tolerated() {
        let tile = decode_pnts(&build_pnts(r#"{"POINTS_LENGTH":2}"#, &[])).unwrap();
        assert!(!tile.has_positions());
        assert_eq!(tile.colors, vec![255; 8]);
    }

    #[test]
    fn bad_magic() {
        let mut data = build_pnts(r#"{"POINTS_LENGTH":0}"#, &[]);
        data[..4].copy_from_slice(b"b3dm");
        assert!(matches!(
            decode_pnts(&data),
            Err(FormatError::BadMagic { format: "pnts", .. })
        ));
    }

    #[test]
    fn short_body_is_an_error() {
        let body = f32_body(&[0.0; 3]);
        let json = r#"{"POINTS_LENGTH":2,"POSITION":{"byteOffset":0}}"#;
        assert!(matches!(
            decode_pnts(&build_pnts(json, &body)),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn short_header_is_an_error() {
        assert!(matches!(
            decode_pnts(b"pnts\x01\x00"),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn huge_points_length_fails_before_allocating() {
        let body = f32_body(&[0.0; 3]);
        let json = r#"{"POINTS_LENGTH":1000000000000,"POSITION":{"byteOffset":0}}"#;
        assert!(matches!(
            decode_pnts(&build_pnts(json, &body)),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn color_size_overflow_is_an_error() {
        let json = r#"{"POINTS_LENGTH":4611686018427387904,"RGBA":{"byteOffset":0}}"#;
        assert!(matches!(
            decode_pnts(&build_pnts(json, &[1, 2, 3, 4])),
            Err(FormatError::FeatureTable(_))
        ));
    }

    #[test]
    fn byte_offset_overflow_is_an_error() {
        let body = f32_body(&[0.0; 3]);
        let json = r#"{"POINTS_LENGTH":1,"POSITION":{"byteOffset":18446744073709551615}}"#;
        assert!(matches!(
            decode_pnts(&build_pnts(json, &body)),
            Err(FormatError::FeatureTable(_))
        ));
    }

    #[test]
    fn unbacked_points_length_is_an_error() {
        let json = r#"{"POINTS_LENGTH":1000000000000}"#;
        assert!(matches!(
            decode_pnts(&build_pnts(json, &[])),
            Err(FormatError::FeatureTable(_))
        ));
    }

    #[test]
    fn feature_table_must_be_an_object() {
        assert!(matches!(
            decode_pnts(&build_pnts("[1,2]", &[])),
            Err(FormatError::FeatureTable(_))
        ));
    }
}
