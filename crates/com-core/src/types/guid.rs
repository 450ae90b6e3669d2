//! 128-bit globally unique identifiers
//!
//! Every capability contract (IID) and every component class (CLSID) is
//! named by a [`Guid`]. Values are plain `Copy` data and can be built in
//! `const` context, so well-known identifiers are compile-time constants
//! with no initialization order.

use std::fmt;
use std::str::FromStr;
use bytes::{Buf, BufMut};
use super::error::{ComError, Result};

/// Interface identifier
pub type Iid = Guid;

/// Class identifier
pub type Clsid = Guid;

/// A GUID in the native field layout (Data1, Data2, Data3, Data4)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// Size of a GUID in bytes
    pub const SIZE: usize = 16;

    /// Nil GUID (all zeros)
    pub const NIL: Self = Self::from_u128(0);

    /// Build from the individual fields
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self { data1, data2, data3, data4 }
    }

    /// Build from the value as read in canonical text order, e.g.
    /// `Guid::from_u128(0x00000001_0000_0000_c000_000000000046)`
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    /// The value in canonical text order
    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// Generate a new random (v4) GUID
    pub fn generate() -> Self {
        Self::from_u128(uuid::Uuid::new_v4().as_u128())
    }

    /// Check if this is the nil GUID
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Parse `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, optionally wrapped in braces.
    /// Hex digits are case-insensitive.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let body = match s.strip_prefix('{') {
            Some(rest) => rest
                .strip_suffix('}')
                .ok_or_else(|| ComError::InvalidGuid(format!("unbalanced braces in {s:?}")))?,
            None => s,
        };
        if body.len() != 36 {
            return Err(ComError::InvalidGuid(format!(
                "expected 36 characters, got {} in {s:?}",
                body.len()
            )));
        }

        let mut digits = String::with_capacity(32);
        for (i, c) in body.chars().enumerate() {
            match i {
                8 | 13 | 18 | 23 => {
                    if c != '-' {
                        return Err(ComError::InvalidGuid(format!(
                            "expected '-' at offset {i} in {s:?}"
                        )));
                    }
                }
                _ if c.is_ascii_hexdigit() => digits.push(c),
                _ => {
                    return Err(ComError::InvalidGuid(format!(
                        "invalid hex digit {c:?} at offset {i} in {s:?}"
                    )))
                }
            }
        }

        let value = u128::from_str_radix(&digits, 16)
            .map_err(|e| ComError::InvalidGuid(format!("{s:?}: {e}")))?;
        Ok(Self::from_u128(value))
    }

    /// Encode in the native binary layout
    pub fn encode<B: BufMut>(&self, buf: &mut B, little_endian: bool) {
        if little_endian {
            buf.put_u32_le(self.data1);
            buf.put_u16_le(self.data2);
            buf.put_u16_le(self.data3);
        } else {
            buf.put_u32(self.data1);
            buf.put_u16(self.data2);
            buf.put_u16(self.data3);
        }
        buf.put_slice(&self.data4);
    }

    /// Decode from the native binary layout
    pub fn decode<B: Buf>(buf: &mut B, little_endian: bool) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(ComError::BufferUnderflow {
                needed: Self::SIZE,
                have: buf.remaining(),
            });
        }

        let data1 = if little_endian { buf.get_u32_le() } else { buf.get_u32() };
        let data2 = if little_endian { buf.get_u16_le() } else { buf.get_u16() };
        let data3 = if little_endian { buf.get_u16_le() } else { buf.get_u16() };
        let mut data4 = [0u8; 8];
        buf.copy_to_slice(&mut data4);

        Ok(Self { data1, data2, data3, data4 })
    }

    /// The 16-byte in-memory layout on little-endian hosts
    pub fn to_bytes_le(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.data1.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.data2.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.data3.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.data4);
        bytes
    }

    /// Inverse of [`Guid::to_bytes_le`]
    pub fn from_bytes_le(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        Self::decode(&mut buf, true)
    }
}

impl FromStr for Guid {
    type Err = ComError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::LowerHex for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GUID({})", self)
    }
}
