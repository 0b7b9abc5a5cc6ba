//! Shapefile index (`.shx`) reader.

use crate::bounds::Extent;
use crate::cursor::{ByteCursor, Endian};
use crate::error::FormatError;
use crate::shp::{ShapeType, ShapefileHeader, HEADER_WORDS};
use log::{debug, warn};

/// Size of the record header that precedes each geometry record, in words
pub const RECORD_HEADER_WORDS: u32 = 4;

/// Index entry pointing into the geometry file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexRecord {
    /// Offset of the record header in 16-bit words
    pub offset: u32,
    /// Content length in 16-bit words, record header excluded
    pub content_length: u32,
}

impl IndexRecord {
    /// Reads one big-endian entry. Returns `None` for negative values.
    pub fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Option<IndexRecord>, FormatError> {
        let offset = cursor.read_i32_as(Endian::Big)?;
        let content_length = cursor.read_i32_as(Endian::Big)?;
        match (u32::try_from(offset), u32::try_from(content_length)) {
            (Ok(offset), Ok(content_length)) => Ok(Some(IndexRecord {
                offset,
                content_length,
            })),
            _ => Ok(None),
        }
    }

    pub fn byte_offset(&self) -> u64 {
        u64::from(self.offset) * 2
    }

    pub fn byte_length(&self) -> u64 {
        u64::from(self.content_length) * 2
    }

    /// First word after this record, record header included.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(RECORD_HEADER_WORDS) + u64::from(self.content_length)
    }
}

/// Record `index` ends past the start of record `index + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexOverlap {
    pub index: usize,
    pub current_end: u64,
    pub next_offset: u64,
}

/// Decoded index with consistency diagnostics.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    pub header: ShapefileHeader,
    pub records: Vec<IndexRecord>,
    pub overlaps: Vec<IndexOverlap>,
    /// Words between adjacent records
    pub gap_words: u64,
}

impl SpatialIndex {
    pub fn shape_type(&self) -> ShapeType {
        self.header.shape_type
    }

    pub fn bbox(&self) -> Extent {
        self.header.bbox
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_overlaps(&self) -> bool {
        !self.overlaps.is_empty()
    }

    /// `(index records, geometry records)` when the counts differ.
    pub fn count_mismatch(&self, geometry_count: usize) -> Option<(usize, usize)> {
        (self.records.len() != geometry_count).then_some((self.records.len(), geometry_count))
    }

    fn check_layout(&mut self) {
        if let Some(first) = self.records.first() {
            if first.offset < HEADER_WORDS {
                warn!(
                    "first index record starts at word {}, inside the {HEADER_WORDS} word header",
                    first.offset
                );
            }
        }
        for (i, pair) in self.records.windows(2).enumerate() {
            let current_end = pair[0].end();
            let next_offset = u64::from(pair[1].offset);
            if next_offset < current_end {
                warn!("index record {i} overlaps the next: ends at {current_end}, next at {next_offset}");
                self.overlaps.push(IndexOverlap {
                    index: i,
                    current_end,
                    next_offset,
                });
            } else {
                self.gap_words += next_offset - current_end;
            }
        }
    }
}

/// Decodes a `.shx` file held in memory.
pub fn read_shx(data: &[u8]) -> Result<SpatialIndex, FormatError> {
    let mut cursor = ByteCursor::new(data);
    let header = ShapefileHeader::read_from(&mut cursor, "shx")?;

    let mut records = Vec::with_capacity(cursor.remaining() / 8);
    while cursor.remaining() >= 8 {
        match IndexRecord::read_from(&mut cursor)? {
            Some(record) => records.push(record),
            None => {
                warn!("negative index entry at byte {}, stopping", cursor.position() - 8);
                break;
            }
        }
    }
    if cursor.remaining() > 0 {
        debug!("{} bytes left unread after index records", cursor.remaining());
    }

    let mut index = SpatialIndex {
        header,
        records,
        overlaps: Vec::new(),
        gap_words: 0,
    };
    index.check_layout();
    debug!(
        "read {} index records, {} overlaps",
        index.records.len(),
        index.overlaps.len()
    );
    Ok(index)
}
