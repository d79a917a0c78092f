use std::fmt;
use std::num::ParseIntError;
use thiserror::Error;

/// The hex encoding of the all-zero trace identifier, returned whenever an
/// identifier is requested from an absent context.
pub const TRACE_ID_ZERO: &str = "00000000000000000000000000000000";

/// A 128-bit trace identifier, stored big-endian as `<upper><lower>`.
///
/// The lower 8 bytes are the legacy 64-bit identifier space. The upper
/// 8 bytes are either all zero (64-bit mode), derived from the root span's
/// start time (`<32-bit unix seconds><32 zero bits>`), or carried over
/// verbatim from a remote parent. Once a span context has captured an
/// identifier, its upper half must not change.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

/// Error returned when the upper half of a [`TraceId`] cannot be parsed
/// from a hex string.
#[derive(Error, Debug)]
#[error("malformed {value:?}: {source}")]
pub struct ParseTraceIdError {
    /// The rejected input.
    pub value: String,
    source: ParseIntError,
}

impl TraceId {
    /// The all-zero identifier, used as the "empty" sentinel.
    pub const EMPTY: TraceId = TraceId([0; 16]);

    /// Create a trace identifier from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(bytes)
    }

    /// Return the representation of this trace identifier as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    /// The lower 64 bits of the identifier.
    pub fn lower(&self) -> u64 {
        u64::from_be_bytes(self.0[8..].try_into().unwrap_or_default())
    }

    /// The upper 64 bits of the identifier.
    pub fn upper(&self) -> u64 {
        u64::from_be_bytes(self.0[..8].try_into().unwrap_or_default())
    }

    /// Overwrite the lower 64 bits of the identifier.
    pub fn set_lower(&mut self, i: u64) {
        self.0[8..].copy_from_slice(&i.to_be_bytes());
    }

    /// Overwrite the upper 64 bits of the identifier.
    pub fn set_upper(&mut self, i: u64) {
        self.0[..8].copy_from_slice(&i.to_be_bytes());
    }

    /// Parse `s` as an unsigned 64-bit hex value and store it as the upper
    /// half of the identifier. Fails on malformed input, leaving the
    /// identifier untouched.
    pub fn set_upper_from_hex(&mut self, s: &str) -> Result<(), ParseTraceIdError> {
        let u = u64::from_str_radix(s, 16).map_err(|source| ParseTraceIdError {
            value: s.to_string(),
            source,
        })?;
        self.set_upper(u);
        Ok(())
    }

    /// Returns `true` if every byte of the identifier is zero.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Returns `true` if any byte in the upper half is non-zero.
    pub fn has_upper(&self) -> bool {
        self.0[..8].iter().any(|&b| b != 0)
    }

    /// The full 128 bits as 32 lowercase hex characters.
    pub fn hex_encoded(&self) -> String {
        format!("{:032x}", u128::from_be_bytes(self.0))
    }

    /// The upper half as 16 lowercase hex characters.
    pub fn upper_hex(&self) -> String {
        format!("{:016x}", self.upper())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", u128::from_be_bytes(self.0)))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", u128::from_be_bytes(self.0)))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&u128::from_be_bytes(self.0), f)
    }
}
