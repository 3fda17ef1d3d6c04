//! Specifier-driven binary packing for world object records.
//!
//! A specifier string lists one character per value:
//!
//! | char | value |
//! |------|-------|
//! | `B`  | unsigned 8-bit |
//! | `H`  | unsigned 16-bit |
//! | `I`  | unsigned 32-bit |
//! | `b`  | signed 8-bit |
//! | `h`  | signed 16-bit |
//! | `i`  | signed 32-bit |
//! | `f`  | boolean flag |
//!
//! Integers are written big-endian. A run of consecutive `f` specifiers
//! shares bytes: the first flag of the run lands in the most significant bit,
//! and the run occupies `ceil(n / 8)` bytes.

use bytes::{Buf, BufMut};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown specifier '{0}'")]
    UnknownSpecifier(char),

    #[error("ran out of bytes at offset {offset}: record needs {needed}, only {available} left")]
    Underrun {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("value {value} does not fit specifier '{spec}'")]
    ValueOutOfRange { spec: char, value: i64 },

    #[error("specifier '{spec}' expects {expected} value")]
    TypeMismatch { spec: char, expected: &'static str },

    #[error("specifier string describes {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
}

/// A single packed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Flag(bool),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Flag(f) => Some(*f),
            Value::Int(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spec {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    Flag,
}

impl Spec {
    fn parse(c: char) -> Result<Self, CodecError> {
        Ok(match c {
            'B' => Spec::U8,
            'H' => Spec::U16,
            'I' => Spec::U32,
            'b' => Spec::I8,
            'h' => Spec::I16,
            'i' => Spec::I32,
            'f' => Spec::Flag,
            other => return Err(CodecError::UnknownSpecifier(other)),
        })
    }

    fn as_char(self) -> char {
        match self {
            Spec::U8 => 'B',
            Spec::U16 => 'H',
            Spec::U32 => 'I',
            Spec::I8 => 'b',
            Spec::I16 => 'h',
            Spec::I32 => 'i',
            Spec::Flag => 'f',
        }
    }

    fn width(self) -> usize {
        match self {
            Spec::U8 | Spec::I8 => 1,
            Spec::U16 | Spec::I16 => 2,
            Spec::U32 | Spec::I32 => 4,
            Spec::Flag => 0,
        }
    }

    fn range(self) -> (i64, i64) {
        match self {
            Spec::U8 => (0, u8::MAX as i64),
            Spec::U16 => (0, u16::MAX as i64),
            Spec::U32 => (0, u32::MAX as i64),
            Spec::I8 => (i8::MIN as i64, i8::MAX as i64),
            Spec::I16 => (i16::MIN as i64, i16::MAX as i64),
            Spec::I32 => (i32::MIN as i64, i32::MAX as i64),
            Spec::Flag => (0, 1),
        }
    }
}

fn parse(spec: &str) -> Result<Vec<Spec>, CodecError> {
    spec.chars().map(Spec::parse).collect()
}

/// Index one past the end of the flag run starting at `start`.
fn flag_run_end(specs: &[Spec], start: usize) -> usize {
    specs[start..]
        .iter()
        .position(|s| *s != Spec::Flag)
        .map_or(specs.len(), |len| start + len)
}

fn packed_len_of(specs: &[Spec]) -> usize {
    let mut len = 0;
    let mut i = 0;
    while i < specs.len() {
        if specs[i] == Spec::Flag {
            let end = flag_run_end(specs, i);
            len += (end - i).div_ceil(8);
            i = end;
        } else {
            len += specs[i].width();
            i += 1;
        }
    }
    len
}

/// Number of bytes a record with this specifier string occupies.
pub fn packed_len(spec: &str) -> Result<usize, CodecError> {
    Ok(packed_len_of(&parse(spec)?))
}

/// Packs `values` according to `spec`.
pub fn pack(spec: &str, values: &[Value]) -> Result<Vec<u8>, CodecError> {
    let specs = parse(spec)?;
    if specs.len() != values.len() {
        return Err(CodecError::ArityMismatch {
            expected: specs.len(),
            actual: values.len(),
        });
    }

    let mut buf = Vec::with_capacity(packed_len_of(&specs));
    let mut i = 0;
    while i < specs.len() {
        if specs[i] == Spec::Flag {
            let end = flag_run_end(&specs, i);
            let mut byte = 0u8;
            let mut bit = 0;
            for value in &values[i..end] {
                let flag = value.as_flag().ok_or(CodecError::TypeMismatch {
                    spec: 'f',
                    expected: "a flag",
                })?;
                if flag {
                    byte |= 0x80 >> bit;
                }
                bit += 1;
                if bit == 8 {
                    buf.put_u8(byte);
                    byte = 0;
                    bit = 0;
                }
            }
            if bit > 0 {
                buf.put_u8(byte);
            }
            i = end;
            continue;
        }

        let spec = specs[i];
        let value = values[i].as_int().ok_or(CodecError::TypeMismatch {
            spec: spec.as_char(),
            expected: "an integer",
        })?;
        let (min, max) = spec.range();
        if value < min || value > max {
            return Err(CodecError::ValueOutOfRange {
                spec: spec.as_char(),
                value,
            });
        }
        match spec {
            Spec::U8 => buf.put_u8(value as u8),
            Spec::U16 => buf.put_u16(value as u16),
            Spec::U32 => buf.put_u32(value as u32),
            Spec::I8 => buf.put_i8(value as i8),
            Spec::I16 => buf.put_i16(value as i16),
            Spec::I32 => buf.put_i32(value as i32),
            Spec::Flag => unreachable!("flag runs are handled above"),
        }
        i += 1;
    }

    Ok(buf)
}

/// Unpacks one record described by `spec` from `bytes[offset..]`.
///
/// Returns the decoded values and the number of bytes consumed. Fails with
/// [`CodecError::Underrun`] before reading anything if the buffer is short.
pub fn unpack(spec: &str, bytes: &[u8], offset: usize) -> Result<(Vec<Value>, usize), CodecError> {
    let specs = parse(spec)?;
    let needed = packed_len_of(&specs);
    let available = bytes.len().saturating_sub(offset);
    if available < needed {
        return Err(CodecError::Underrun {
            offset,
            needed,
            available,
        });
    }

    let mut cursor = &bytes[offset..offset + needed];
    let mut values = Vec::with_capacity(specs.len());
    let mut i = 0;
    while i < specs.len() {
        if specs[i] == Spec::Flag {
            let end = flag_run_end(&specs, i);
            let mut byte = 0u8;
            for bit in 0..(end - i) {
                if bit % 8 == 0 {
                    byte = cursor.get_u8();
                }
                values.push(Value::Flag(byte & (0x80 >> (bit % 8)) != 0));
            }
            i = end;
            continue;
        }

        let value = match specs[i] {
            Spec::U8 => cursor.get_u8() as i64,
            Spec::U16 => cursor.get_u16() as i64,
            Spec::U32 => cursor.get_u32() as i64,
            Spec::I8 => cursor.get_i8() as i64,
            Spec::I16 => cursor.get_i16() as i64,
            Spec::I32 => cursor.get_i32() as i64,
            Spec::Flag => unreachable!("flag runs are handled above"),
        };
        values.push(Value::Int(value));
        i += 1;
    }

    Ok((values, needed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let bytes = pack("BHi", &[Value::Int(7), Value::Int(0x0102), Value::Int(-2)]).unwrap();
        assert_eq!(bytes, vec![7, 0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE]);

        let (values, consumed) = unpack("BHi", &bytes, 0).unwrap();
        assert_eq!(consumed, 7);
        assert_eq!(values, vec![Value::Int(7), Value::Int(0x0102), Value::Int(-2)]);
    }

    #[test]
    fn flags_share_bytes() {
        let three = [Value::Flag(true), Value::Flag(false), Value::Flag(true)];
        assert_eq!(pack("fff", &three).unwrap(), vec![0b1010_0000]);

        let nine: Vec<Value> = (0..9).map(|i| Value::Flag(i == 8)).collect();
        let bytes = pack("fffffffff", &nine).unwrap();
        assert_eq!(bytes, vec![0, 0b1000_0000]);

        let (values, consumed) = unpack("fffffffff", &bytes, 0).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(values, nine);
    }

    #[test]
    fn flag_run_broken_by_integer_starts_new_byte() {
        let values = [Value::Flag(true), Value::Int(3), Value::Flag(true)];
        assert_eq!(pack("fBf", &values).unwrap(), vec![0x80, 3, 0x80]);
        assert_eq!(packed_len("fBf").unwrap(), 3);
    }

    #[test]
    fn unpack_honours_offset() {
        let bytes = [0xAA, 0xBB, 0x00, 0x05];
        let (values, consumed) = unpack("H", &bytes, 2).unwrap();
        assert_eq!(values, vec![Value::Int(5)]);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn short_buffer_is_underrun() {
        let err = unpack("HH", &[0, 1, 2], 0).unwrap_err();
        assert_eq!(
            err,
            CodecError::Underrun {
                offset: 0,
                needed: 4,
                available: 3
            }
        );

        let err = unpack("B", &[1], 5).unwrap_err();
        assert!(matches!(err, CodecError::Underrun { available: 0, .. }));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            pack("B", &[Value::Int(256)]).unwrap_err(),
            CodecError::ValueOutOfRange { spec: 'B', value: 256 }
        );
        assert_eq!(
            pack("H", &[Value::Int(-1)]).unwrap_err(),
            CodecError::ValueOutOfRange { spec: 'H', value: -1 }
        );
        assert!(matches!(
            pack("f", &[Value::Int(1)]),
            Err(CodecError::TypeMismatch { spec: 'f', .. })
        ));
        assert!(matches!(
            pack("BB", &[Value::Int(1)]),
            Err(CodecError::ArityMismatch { expected: 2, actual: 1 })
        ));
        assert_eq!(unpack("Z", &[], 0).unwrap_err(), CodecError::UnknownSpecifier('Z'));
    }
}
