use lazy_static::lazy_static;

/// The base32 alphabet used on the wire for session ids, client ids, salts
/// and password hashes. RFC-4648 uppercase, never padded.
pub const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

lazy_static! {
    static ref REVERSE: [u8; 256] = {
        let mut table = [0xffu8; 256];
        for (value, &symbol) in ALPHABET.iter().enumerate() {
            table[symbol as usize] = value as u8;
        }
        table
    };
}

/// Value of a single alphabet symbol, or `None` for anything else.
#[inline]
pub fn value_of(symbol: u8) -> Option<u8> {
    match REVERSE[symbol as usize] {
        0xff => None,
        value => Some(value),
    }
}

/// Encode the supplied bytes, most significant bits first. The output length
/// is `ceil(len * 8 / 5)` characters.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut acc = 0u32;
    let mut bits = 0u32;

    for &byte in data {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;

        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        out.push(ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

/// Decode a base32 string into bytes, dropping any final partial byte.
/// Returns `None` on symbols outside the alphabet.
pub fn decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut acc = 0u32;
    let mut bits = 0u32;

    for &symbol in text.as_bytes() {
        acc = (acc << 5) | u32::from(value_of(symbol)?);
        bits += 5;

        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }

    Some(out)
}
