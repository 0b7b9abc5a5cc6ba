//! Byte cursor shared by all binary decoders.
//!
//! Shapefile-family headers switch byte order in the middle of a header, so the
//! order is a cursor-wide mode that can be changed at any position, and every
//! read also has an explicit-order variant.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

/// Byte order of a multi-byte read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    Big,
    #[default]
    Little,
}

/// A read ran past the end of the underlying buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfData {
    /// Cursor position when the read was attempted
    pub position: usize,
    /// Number of bytes the read needed
    pub wanted: usize,
    /// Number of bytes that were left
    pub remaining: usize,
}

impl fmt::Display for OutOfData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "out of data at byte {}: wanted {} bytes, {} remaining",
            self.position, self.wanted, self.remaining
        )
    }
}

impl std::error::Error for OutOfData {}

macro_rules! typed_reads {
    ($($read:ident, $read_as:ident, $ty:ty, $size:expr, $decode:ident;)*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "` in the cursor's current byte order.")]
            #[inline]
            pub fn $read(&mut self) -> Result<$ty, OutOfData> {
                self.$read_as(self.order)
            }

            #[doc = concat!("Reads a `", stringify!($ty), "` in the given byte order.")]
            #[inline]
            pub fn $read_as(&mut self, order: Endian) -> Result<$ty, OutOfData> {
                let bytes = self.take($size)?;
                Ok(match order {
                    Endian::Big => BigEndian::$decode(bytes),
                    Endian::Little => LittleEndian::$decode(bytes),
                })
            }
        )*
    };
}

/// Read position over a borrowed byte buffer.
#[derive(Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    order: Endian,
}

impl<'a> ByteCursor<'a> {
    /// Little-endian cursor at position 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_order(data, Endian::Little)
    }

    pub fn with_order(data: &'a [u8], order: Endian) -> Self {
        ByteCursor {
            data,
            pos: 0,
            order,
        }
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    /// Switches the byte order for subsequent reads; the position is kept.
    pub fn set_order(&mut self, order: Endian) {
        self.order = order;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Moves to an absolute position. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<(), OutOfData> {
        if pos > self.data.len() {
            return Err(OutOfData {
                position: self.pos,
                wanted: pos - self.pos,
                remaining: self.remaining(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), OutOfData> {
        self.take(n).map(|_| ())
    }

    /// Byte at the current position without consuming it.
    pub fn peek_u8(&self) -> Result<u8, OutOfData> {
        self.data.get(self.pos).copied().ok_or(OutOfData {
            position: self.pos,
            wanted: 1,
            remaining: 0,
        })
    }

    /// Borrows the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], OutOfData> {
        self.take(n)
    }

    pub fn read_u8(&mut self) -> Result<u8, OutOfData> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, OutOfData> {
        Ok(self.take(1)?[0] as i8)
    }

    typed_reads! {
        read_u16, read_u16_as, u16, 2, read_u16;
        read_i16, read_i16_as, i16, 2, read_i16;
        read_u32, read_u32_as, u32, 4, read_u32;
        read_i32, read_i32_as, i32, 4, read_i32;
        read_u64, read_u64_as, u64, 8, read_u64;
        read_i64, read_i64_as, i64, 8, read_i64;
        read_f32, read_f32_as, f32, 4, read_f32;
        read_f64, read_f64_as, f64, 8, read_f64;
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfData> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(OutOfData {
                position: self.pos,
                wanted: n,
                remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

impl fmt::Debug for ByteCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteCursor")
            .field("position", &self.pos)
            .field("data", &format_args!("[u8; {}]", self.data.len()))
            .field("order", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_order_without_moving() {
        let data = [0x00, 0x00, 0x27, 0x0a, 0xe8, 0x03, 0x00, 0x00];
        let mut cursor = ByteCursor::with_order(&data, Endian::Big);
        assert_eq!(cursor.read_i32().unwrap(), 9994);
        cursor.set_order(Endian::Little);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.read_i32().unwrap(), 1000);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn explicit_order_ignores_mode() {
        let data = [0x01, 0x02];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u16_as(Endian::Big).unwrap(), 0x0102);
        assert_eq!(cursor.order(), Endian::Little);
    }

    #[test]
    fn short_read_fails_without_consuming() {
        let data = [1u8, 2, 3];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(1).unwrap();
        let err = cursor.read_u32().unwrap_err();
        assert_eq!(
            err,
            OutOfData {
                position: 1,
                wanted: 4,
                remaining: 2
            }
        );
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_bytes(2).unwrap(), &[2, 3]);
    }

    #[test]
    fn seek_bounds() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data);
        assert!(cursor.seek(4).is_ok());
        assert!(cursor.peek_u8().is_err());
        assert!(cursor.seek(5).is_err());
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn floats() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_le_bytes());
        data.extend_from_slice(&(-2.25f64).to_be_bytes());
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
        assert_eq!(cursor.read_f64_as(Endian::Big).unwrap(), -2.25);
    }
}
