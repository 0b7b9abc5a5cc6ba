//! dBASE attribute table (`.dbf`) reader.
//!
//! 32 byte header, 32 byte field descriptors terminated by `0x0D`, then
//! fixed-length rows of ASCII fields, each row led by a deletion flag.

use crate::cursor::ByteCursor;
use crate::error::FormatError;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

const FILE_HEADER_SIZE: usize = 32;
const FIELD_TERMINATOR: u8 = 0x0D;
const DELETED_FLAG: u8 = b'*';

/// Field type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Number,
    Logical,
    Date,
    Float,
    /// Any other tag; values are kept as text
    Other(u8),
}

impl From<u8> for FieldType {
    fn from(tag: u8) -> Self {
        match tag {
            b'C' => FieldType::Character,
            b'N' => FieldType::Number,
            b'L' => FieldType::Logical,
            b'D' => FieldType::Date,
            b'F' => FieldType::Float,
            other => FieldType::Other(other),
        }
    }
}

/// Declared column
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Width of the field in a row, in bytes
    pub length: usize,
    pub decimal_count: u8,
}

impl FieldDescriptor {
    fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self, FormatError> {
        let name_bytes = cursor.read_bytes(11)?;
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(11);
        let name = String::from_utf8_lossy(&name_bytes[..name_end])
            .trim()
            .to_string();
        let field_type = FieldType::from(cursor.read_u8()?);
        cursor.skip(4)?; // field data address
        let length = cursor.read_u8()? as usize;
        let decimal_count = cursor.read_u8()?;
        cursor.skip(14)?;
        Ok(FieldDescriptor {
            name,
            field_type,
            length,
            decimal_count,
        })
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}), length={}", self.name, self.field_type, self.length)
    }
}

/// Typed field value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// `YYYY-MM-DD`, or the raw text when it is not an 8 digit date
    Date(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric value of `Integer` and `Real`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            _ => None,
        }
    }

    /// Text of `Text` and `Date`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Date(s) => Some(s),
            _ => None,
        }
    }

    fn parse(raw: &[u8], field: &FieldDescriptor) -> Value {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if text.is_empty() {
            return Value::Null;
        }
        match field.field_type {
            FieldType::Character | FieldType::Other(_) => Value::Text(text.to_string()),
            FieldType::Number | FieldType::Float => {
                let parsed = if field.decimal_count > 0 {
                    text.parse().map(Value::Real).ok()
                } else {
                    text.parse().map(Value::Integer).ok()
                };
                parsed.unwrap_or_else(|| {
                    warn!("could not parse field {} value {text:?}", field.name);
                    Value::Text(text.to_string())
                })
            }
            FieldType::Logical => Value::Boolean(matches!(
                text.chars().next(),
                Some('T' | 't' | 'Y' | 'y')
            )),
            FieldType::Date => {
                if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
                    Value::Date(format!("{}-{}-{}", &text[..4], &text[4..6], &text[6..]))
                } else {
                    Value::Date(text.to_string())
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) | Value::Date(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// One non-deleted row, with a value for every declared field.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeRecord {
    fields: Arc<[FieldDescriptor]>,
    values: Vec<Value>,
}

impl AttributeRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        let i = self.fields.iter().position(|f| f.name == name)?;
        self.values.get(i)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// (field name, value) pairs in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .zip(self.values.iter())
    }
}

/// Decoded attribute table
#[derive(Clone, Debug)]
pub struct AttributeTable {
    pub version: u8,
    /// (year, month, day) of the last update
    pub last_update: (u16, u8, u8),
    /// Row count stated by the header, deleted rows included
    pub declared_record_count: usize,
    pub header_length: usize,
    pub record_length: usize,
    pub fields: Arc<[FieldDescriptor]>,
    /// Non-deleted rows, densely renumbered
    pub records: Vec<AttributeRecord>,
    pub deleted_count: usize,
    /// The buffer ended before all declared rows were read
    pub truncated: bool,
}

impl AttributeTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AttributeRecord> {
        self.records.get(index)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Decodes a `.dbf` file held in memory.
pub fn read_dbf(data: &[u8]) -> Result<AttributeTable, FormatError> {
    let mut cursor = ByteCursor::new(data);

    let version = cursor.read_u8()?;
    let year = cursor.read_u8()?;
    let month = cursor.read_u8()?;
    let day = cursor.read_u8()?;
    let declared = cursor.read_i32()?;
    let header_length = cursor.read_u16()? as usize;
    let record_length = cursor.read_u16()? as usize;
    cursor.seek(FILE_HEADER_SIZE)?;

    let declared_record_count = if declared < 0 {
        warn!("negative record count {declared}, reading no records");
        0
    } else {
        declared as usize
    };
    debug!(
        "dbf version {version}, {declared_record_count} records, header {header_length} bytes, record {record_length} bytes"
    );

    let mut fields = Vec::new();
    while cursor.position() + 1 < header_length {
        if cursor.peek_u8()? == FIELD_TERMINATOR {
            cursor.skip(1)?;
            break;
        }
        let field = FieldDescriptor::read_from(&mut cursor)?;
        debug!("  field {field}");
        fields.push(field);
    }
    cursor.seek(header_length)?;

    let row_width = 1 + fields.iter().map(|f| f.length).sum::<usize>();
    if row_width != record_length {
        debug!("declared record length {record_length} differs from field widths {row_width}");
    }

    let fields: Arc<[FieldDescriptor]> = fields.into();
    let mut records = Vec::new();
    let mut deleted_count = 0;
    let mut truncated = false;

    for i in 0..declared_record_count {
        if cursor.remaining() == 0 {
            warn!("unexpected end of file at record {i}");
            truncated = true;
            break;
        }
        let deleted = cursor.read_u8()? == DELETED_FLAG;

        let mut values = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            match cursor.read_bytes(field.length) {
                Ok(raw) => values.push(Value::parse(raw, field)),
                Err(_) => {
                    warn!("buffer exhausted reading field {} in record {i}", field.name);
                    truncated = true;
                    break;
                }
            }
        }

        if deleted {
            deleted_count += 1;
        } else if !values.is_empty() || fields.is_empty() {
            values.resize(fields.len(), Value::Null);
            records.push(AttributeRecord {
                fields: Arc::clone(&fields),
                values,
            });
        }
        if truncated {
            break;
        }
    }

    debug!("loaded {} records", records.len());
    Ok(AttributeTable {
        version,
        last_update: (1900 + year as u16, month, day),
        declared_record_count,
        header_length,
        record_length,
        fields,
        records,
        deleted_count,
        truncated,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Builds a `.dbf` from (name, type, length, decimals) fields and
    /// (deleted, values) rows; values are space padded to the field width.
    pub(crate) fn build_dbf(fields: &[(&str, u8, u8, u8)], rows: &[(bool, &[&str])]) -> Vec<u8> {
        let header_length = 32 + 32 * fields.len() + 1;
        let record_length = 1 + fields.iter().map(|f| f.2 as usize).sum::<usize>();
        let mut out = Vec::new();
        out.extend_from_slice(&[3, 124, 5, 17]);
        out.write_i32::<LittleEndian>(rows.len() as i32).unwrap();
        out.write_u16::<LittleEndian>(header_length as u16).unwrap();
        out.write_u16::<LittleEndian>(record_length as u16).unwrap();
        out.resize(32, 0);
        for (name, tag, length, decimals) in fields {
            let mut name_bytes = [0u8; 11];
            name_bytes[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&name_bytes);
            out.push(*tag);
            out.extend_from_slice(&[0; 4]);
            out.push(*length);
            out.push(*decimals);
            out.extend_from_slice(&[0; 14]);
        }
        out.push(FIELD_TERMINATOR);
        for (deleted, values) in rows {
            out.push(if *deleted { b'*' } else { b' ' });
            for ((_, _, length, _), value) in fields.iter().zip(values.iter()) {
                let mut cell = vec![b' '; *length as usize];
                let n = value.len().min(cell.len());
                cell[..n].copy_from_slice(&value.as_bytes()[..n]);
                out.extend_from_slice(&cell);
            }
        }
        out
    }

    fn sample() -> Vec<u8> {
        build_dbf(
            &[
                ("NAME", b'C', 8, 0),
                ("FLOORS", b'N', 4, 0),
                ("HEIGHT", b'N', 6, 2),
                ("OK", b'L', 1, 0),
                ("BUILT", b'D', 8, 0),
            ],
            &[
                (false, &["Tower", "12", "36.50", "T", "20200131"]),
                (true, &["Gone", "1", "3.00", "F", "19991231"]),
                (false, &["Shed", "x", "2.25", "n", "2021"]),
            ],
        )
    }

    #[test]
    fn header_and_fields() {
        let table = read_dbf(&sample()).unwrap();
        assert_eq!(table.version, 3);
        assert_eq!(table.last_update, (2024, 5, 17));
        assert_eq!(table.declared_record_count, 3);
        assert_eq!(table.fields.len(), 5);
        assert_eq!(table.field("HEIGHT").unwrap().decimal_count, 2);
        assert_eq!(table.field("OK").unwrap().field_type, FieldType::Logical);
    }

    #[test]
    fn typed_values_and_deleted_rows() {
        let table = read_dbf(&sample()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.deleted_count, 1);
        assert!(!table.truncated);

        let tower = table.get(0).unwrap();
        assert_eq!(tower.get("NAME"), Some(&Value::Text("Tower".into())));
        assert_eq!(tower.get("FLOORS"), Some(&Value::Integer(12)));
        assert_eq!(tower.get("HEIGHT"), Some(&Value::Real(36.5)));
        assert_eq!(tower.get("OK"), Some(&Value::Boolean(true)));
        assert_eq!(tower.get("BUILT"), Some(&Value::Date("2020-01-31".into())));

        // dense renumbering: the deleted row leaves no gap
        let shed = table.get(1).unwrap();
        assert_eq!(shed.get("NAME"), Some(&Value::Text("Shed".into())));
        assert_eq!(shed.get("FLOORS"), Some(&Value::Text("x".into())));
        assert_eq!(shed.get("OK"), Some(&Value::Boolean(false)));
        assert_eq!(shed.get("BUILT"), Some(&Value::Date("2021".into())));
    }

    #[test]
    fn blank_values_are_null() {
        let data = build_dbf(&[("A", b'C', 3, 0), ("B", b'N', 3, 0)], &[(false, &["", ""])]);
        let table = read_dbf(&data).unwrap();
        let names: Vec<_> = table.get(0).unwrap().iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(table.get(0).unwrap().values().iter().all(Value::is_null));
    }

    #[test]
    fn truncated_tail_keeps_partial_row() {
        let mut data = build_dbf(
            &[("A", b'C', 3, 0), ("B", b'C', 3, 0)],
            &[
                (false, &["abc", "def"]),
                (false, &["ghi", "jkl"]),
                (false, &["mno", "pqr"]),
            ],
        );
        // cut in the middle of the third row's second field
        data.truncate(data.len() - 2);
        let table = read_dbf(&data).unwrap();
        assert!(table.truncated);
        assert_eq!(table.len(), 3);
        let last = table.get(2).unwrap();
        assert_eq!(last.get("A"), Some(&Value::Text("mno".into())));
        assert_eq!(last.get("B"), Some(&Value::Null));
    }

    #[test]
    fn missing_rows_stop_reading() {
        let mut data = build_dbf(&[("A", b'C', 2, 0)], &[(false, &["ab"]), (false, &["cd"])]);
        data.truncate(data.len() - 3);
        let table = read_dbf(&data).unwrap();
        assert!(table.truncated);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn short_header_is_an_error() {
        assert!(matches!(read_dbf(&[3, 0, 0]), Err(FormatError::Truncated(_))));
    }

    #[test]
    fn unknown_tag_is_text() {
        let data = build_dbf(&[("M", b'M', 4, 0)], &[(false, &["0012"])]);
        let table = read_dbf(&data).unwrap();
        assert_eq!(table.get(0).unwrap().get("M"), Some(&Value::Text("0012".into())));
    }
}
