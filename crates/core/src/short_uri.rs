//! Short identifier generation and validation.

use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

/// Length of generated short identifiers.
pub const SHORT_URI_LEN: usize = 6;

/// Maximum length accepted for custom short identifiers.
pub const MAX_SHORT_URI_LEN: usize = 32;

/// Attempts at generating an identifier the domain filter has not seen.
pub const MAX_GENERATE_ATTEMPTS: usize = 10;

const BASE62: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Derive a candidate identifier from the origin URL and a per-attempt salt.
pub fn generate(origin_url: &str, salt: Uuid) -> String {
    let mut input = Vec::with_capacity(origin_url.len() + 16);
    input.extend_from_slice(origin_url.as_bytes());
    input.extend_from_slice(salt.as_bytes());
    encode_base62(xxh3_64(&input))
}

/// Fixed-width base62 encoding of the low digits of `value`.
fn encode_base62(mut value: u64) -> String {
    let mut out = [BASE62[0]; SHORT_URI_LEN];
    for slot in out.iter_mut().rev() {
        *slot = BASE62[(value % 62) as usize];
        value /= 62;
    }
    out.iter().map(|&b| b as char).collect()
}

/// Validate a generated or custom short identifier.
pub fn validate_short_uri(short_uri: &str) -> crate::Result<()> {
    if short_uri.is_empty() || short_uri.len() > MAX_SHORT_URI_LEN {
        return Err(crate::Error::InvalidShortUri(format!(
            "length must be 1..={MAX_SHORT_URI_LEN}, got {}",
            short_uri.len()
        )));
    }
    for c in short_uri.chars() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_') {
            return Err(crate::Error::InvalidShortUri(format!(
                "invalid character: {c:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_fixed_width_base62() {
        let id = generate("https://example.com", Uuid::new_v4());
        assert_eq!(id.len(), SHORT_URI_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        validate_short_uri(&id).unwrap();
    }

    #[test]
    fn test_generate_is_deterministic_per_salt() {
        let salt = Uuid::from_u128(42);
        assert_eq!(
            generate("https://example.com", salt),
            generate("https://example.com", salt)
        );
        assert_ne!(
            generate("https://example.com", salt),
            generate("https://example.com", Uuid::from_u128(43))
        );
    }

    #[test]
    fn test_encode_base62_zero_pads() {
        assert_eq!(encode_base62(0), "000000");
        assert_eq!(encode_base62(61), "00000Z");
        assert_eq!(encode_base62(62), "000010");
    }

    #[test]
    fn test_validate_short_uri() {
        assert!(validate_short_uri("abc123").is_ok());
        assert!(validate_short_uri("my-link_2").is_ok());
        assert!(validate_short_uri("").is_err());
        assert!(validate_short_uri("a b").is_err());
        assert!(validate_short_uri("a'; DROP").is_err());
        assert!(validate_short_uri(&"x".repeat(MAX_SHORT_URI_LEN + 1)).is_err());
    }
}
