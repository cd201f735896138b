//! Hex address parsing.

use anyhow::Result;
use sigscope_core::Address;

/// Parse a hex address string (with or without 0x prefix).
pub fn parse_hex_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map(Address::new)
        .map_err(|e| anyhow::anyhow!("Invalid hex address '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_address_with_prefix() {
        assert_eq!(parse_hex_address("0x1000").unwrap(), Address::new(0x1000));
        assert_eq!(parse_hex_address("0X1000").unwrap(), Address::new(0x1000));
    }

    #[test]
    fn test_parse_hex_address_without_prefix() {
        assert_eq!(parse_hex_address("DEADBEEF").unwrap(), Address::new(0xDEADBEEF));
        assert_eq!(parse_hex_address(" 7ff6a0000000 ").unwrap(), Address::new(0x7FF6_A000_0000));
    }

    #[test]
    fn test_parse_hex_address_invalid() {
        assert!(parse_hex_address("GHIJK").is_err());
        assert!(parse_hex_address("0x").is_err());
        assert!(parse_hex_address("0x0x10").is_err());
    }
}
