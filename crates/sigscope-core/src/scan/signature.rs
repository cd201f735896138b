use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A byte pattern where `None` tokens match any byte.
///
/// Never empty. Text form is IDA style: `"48 8B 05 ?? ?? ?? ??"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    tokens: Vec<Option<u8>>,
}

impl Signature {
    pub fn new(tokens: Vec<Option<u8>>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::InvalidSignature("Signature pattern is empty".to_string()));
        }
        Ok(Self { tokens })
    }

    /// Exact bytes, no wildcards
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes.iter().copied().map(Some).collect())
    }

    /// Code-style pair: `mask` has `x` for bytes that must match and `?` for wildcards
    pub fn from_mask(bytes: &[u8], mask: &str) -> Result<Self> {
        if bytes.len() != mask.len() {
            return Err(Error::InvalidSignature(format!(
                "Mask length {} does not match pattern length {}",
                mask.len(),
                bytes.len()
            )));
        }

        let tokens = bytes
            .iter()
            .zip(mask.chars())
            .map(|(&byte, m)| match m {
                'x' | 'X' => Ok(Some(byte)),
                '?' => Ok(None),
                other => Err(Error::InvalidSignature(format!(
                    "Invalid mask character '{}'",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tokens)
    }

    pub fn parse(pattern: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        for token in pattern.split_whitespace() {
            if token == "??" || token == "?" {
                tokens.push(None);
                continue;
            }

            let value = u8::from_str_radix(token, 16).map_err(|e| {
                Error::InvalidSignature(format!("Invalid signature token '{}': {}", token, e))
            })?;
            tokens.push(Some(value));
        }
        Self::new(tokens)
    }

    pub fn tokens(&self) -> &[Option<u8>] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn wildcard_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_none()).count()
    }

    /// Whether the pattern matches `window`, which must be at least `len()` long
    #[inline]
    pub fn matches_at(&self, window: &[u8]) -> bool {
        window.len() >= self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(window)
                .all(|(token, byte)| token.is_none_or(|expected| expected == *byte))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match token {
                Some(value) => write!(f, "{:02X}", value)?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern_with_wildcards() {
        let sig = Signature::parse("48 8D 0D ?? ?? ?? ??").unwrap();
        assert_eq!(sig.len(), 7);
        assert_eq!(sig.tokens()[0], Some(0x48));
        assert_eq!(sig.tokens()[1], Some(0x8D));
        assert_eq!(sig.tokens()[2], Some(0x0D));
        assert_eq!(sig.tokens()[3], None);
        assert_eq!(sig.wildcard_count(), 4);
    }

    #[test]
    fn test_parse_single_question_mark() {
        let sig = Signature::parse("E8 ? ? ? ? 90").unwrap();
        assert_eq!(sig.len(), 6);
        assert_eq!(sig.wildcard_count(), 4);
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(Signature::parse("").is_err());
        assert!(Signature::parse("   ").is_err());
        assert!(Signature::parse("48 GG").is_err());
        assert!(Signature::parse("4800").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        let sig = Signature::new(vec![Some(0x48), Some(0x8D), Some(0x0D), None, Some(0xFF)]).unwrap();
        let formatted = sig.to_string();
        assert_eq!(formatted, "48 8D 0D ?? FF");
        assert_eq!(Signature::parse(&formatted).unwrap(), sig);
    }

    #[test]
    fn test_from_mask() {
        let sig = Signature::from_mask(&[0x48, 0x8B, 0x00, 0xC3], "xx?x").unwrap();
        assert_eq!(sig.to_string(), "48 8B ?? C3");
        assert!(Signature::from_mask(&[0x48], "xx").is_err());
        assert!(Signature::from_mask(&[0x48], "z").is_err());
    }

    #[test]
    fn test_matches_at() {
        let sig = Signature::parse("AA ?? CC").unwrap();
        assert!(sig.matches_at(&[0xAA, 0x00, 0xCC]));
        assert!(sig.matches_at(&[0xAA, 0xFF, 0xCC, 0x11]));
        assert!(!sig.matches_at(&[0xAA, 0x00, 0xCD]));
        assert!(!sig.matches_at(&[0xAA, 0x00]));
    }

    #[test]
    fn test_serde_as_string() {
        let sig = Signature::parse("48 ?? 05").unwrap();
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, "\"48 ?? 05\"");
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
        assert!(serde_json::from_str::<Signature>("\"\"").is_err());
    }
}
