use crate::base32;
use crate::error::{ParseError, ParseResult};
use std::fmt;

/// Length of a client identifier on the wire.
pub const CID_LEN: usize = 13;

// The final character may not have its low bit set, constraining the decoded
// form to exactly 64 bits.
const LAST_CHARS: &[u8] = b"ACEGIKMOQSUWY246";

/// Client identifier: 13 base32 characters, globally unique per peer across
/// the federation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Cid(String);

impl Cid {
    /// Validate and take ownership of the wire form.
    pub fn parse(text: &str) -> ParseResult<Cid> {
        let bytes = text.as_bytes();

        if bytes.len() != CID_LEN {
            return Err(ParseError::BadCid);
        }

        if bytes.iter().any(|&symbol| base32::value_of(symbol).is_none()) {
            return Err(ParseError::BadCid);
        }

        if !LAST_CHARS.contains(&bytes[CID_LEN - 1]) {
            return Err(ParseError::BadCid);
        }

        Ok(Cid(text.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 64 bit binary form fed into the password challenge.
    pub fn to_bytes(&self) -> [u8; 8] {
        let decoded = base32::decode(&self.0).expect("Validated cid must decode");

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&decoded[..8]);
        bytes
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        let cid = Cid::parse("AAAAAAAAAAAAA").unwrap();
        assert_eq!(cid.as_str(), "AAAAAAAAAAAAA");

        assert!(Cid::parse("SQTJZVH5VDZC4").is_ok());
    }

    #[test]
    fn test_parse_rejects_length() {
        assert_eq!(Cid::parse("AAAA"), Err(ParseError::BadCid));
        assert_eq!(Cid::parse("AAAAAAAAAAAAAA"), Err(ParseError::BadCid));
        assert_eq!(Cid::parse(""), Err(ParseError::BadCid));
    }

    #[test]
    fn test_parse_rejects_alphabet() {
        assert_eq!(Cid::parse("AAAAAAAAAAAA0"), Err(ParseError::BadCid));
        assert_eq!(Cid::parse("aaaaaaaaaaaaa"), Err(ParseError::BadCid));
    }

    #[test]
    fn test_parse_rejects_odd_last_char() {
        // B has value 1, low bit set.
        assert_eq!(Cid::parse("AAAAAAAAAAAAB"), Err(ParseError::BadCid));
        // C has value 2 and is fine.
        assert!(Cid::parse("AAAAAAAAAAAAC").is_ok());
    }

    #[test]
    fn test_to_bytes() {
        assert_eq!(Cid::parse("AAAAAAAAAAAAA").unwrap().to_bytes(), [0u8; 8]);

        // 13 chars carry 65 bits; the trailing zero bit is dropped.
        let cid = Cid::parse("777777777776Y").unwrap();
        let bytes = cid.to_bytes();
        assert_eq!(bytes[0], 0xff);
    }
}
