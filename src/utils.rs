use crate::error::Result;

/// Get library version
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Uppercase hex, the format used for APDU traces and power-on data.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Parses hex, ignoring whitespace between bytes.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}
