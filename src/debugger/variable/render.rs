use itertools::Itertools;
use std::str::FromStr;

/// Output filter applied after a typed read or write (`... | hex`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueFilter {
    Hex,
    Bits,
    Addr,
    Dec,
    Bytes,
}

impl FromStr for ValueFilter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(ValueFilter::Hex),
            "bits" => Ok(ValueFilter::Bits),
            "addr" => Ok(ValueFilter::Addr),
            "dec" => Ok(ValueFilter::Dec),
            "bytes" => Ok(ValueFilter::Bytes),
            _ => Err(()),
        }
    }
}

/// `0x` + minimal hex.
pub fn format_hex(value: u64) -> String {
    format!("{value:#x}")
}

/// 64-bit big-endian binary in 8 byte groups.
pub fn format_bits(value: u64) -> String {
    let bytes = value.to_be_bytes();
    bytes.iter().map(|byte| format!("{byte:08b}")).join(" ")
}

/// `0x` + 16 hex digits, zero-padded.
pub fn format_addr(value: u64) -> String {
    format!("{value:#018x}")
}

/// 8 hex bytes, space-separated, most significant first.
pub fn format_bytes(value: u64) -> String {
    let bytes = value.to_be_bytes();
    bytes.iter().map(|byte| format!("{byte:02x}")).join(" ")
}
