//! QR payload sanitizing and shape validation.
//!
//! Event QR codes carry a version-4 UUID. Checking the shape locally lets a
//! malformed scan fail before a location fix or a request is spent on it.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Version-4 UUID: version nibble `4`, variant nibble in `{8, 9, a, b}`.
const UUID_V4_PATTERN: &str =
    r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$";

fn uuid_v4_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(UUID_V4_PATTERN).expect("Invalid regex pattern"))
}

/// A scanned payload that is not a version-4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid QR code: {raw:?}")]
pub struct InvalidQrCode {
    /// The payload as scanned, before sanitizing.
    pub raw: String,
}

/// Trim the payload and drop any whitespace inside it.
///
/// Case is preserved.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.split_whitespace().collect()
}

/// True when `code` is a version-4 UUID in any letter case.
///
/// The check is applied to `code` as given; call [`sanitize`] first for
/// scanner output.
#[must_use]
pub fn is_valid(code: &str) -> bool {
    uuid_v4_regex().is_match(code)
}

/// A sanitized QR code known to have the version-4 UUID shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QrCode(String);

impl QrCode {
    /// Sanitize and validate a scanned payload.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidQrCode`] when the sanitized payload is not a
    /// version-4 UUID.
    pub fn parse(raw: &str) -> Result<Self, InvalidQrCode> {
        let code = sanitize(raw);
        if is_valid(&code) {
            Ok(Self(code))
        } else {
            Err(InvalidQrCode {
                raw: raw.to_string(),
            })
        }
    }

    /// The sanitized code, exactly as it will be submitted.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QrCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for QrCode {
    type Err = InvalidQrCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e34";

    #[test]
    fn test_sanitize_trims() {
        assert_eq!(sanitize("  abc \n"), "abc");
        assert_eq!(sanitize("\t\r\n"), "");
    }

    #[test]
    fn test_sanitize_drops_internal_whitespace() {
        assert_eq!(sanitize("3f2b8c1e- 9d4a"), "3f2b8c1e-9d4a");
        assert_eq!(sanitize("a \t\n b"), "ab");
    }

    #[test]
    fn test_sanitize_preserves_case() {
        assert_eq!(sanitize(" AbC "), "AbC");
    }

    #[test]
    fn test_valid_uuid_v4_in_any_case() {
        assert!(is_valid(VALID));
        assert!(is_valid(&VALID.to_uppercase()));
        assert!(is_valid("3F2B8C1E-9d4a-4C6B-8e2f-1A7D5C9B0E34"));
    }

    #[test]
    fn test_valid_after_sanitize() {
        for raw in [
            format!("  {VALID}  "),
            format!("\n{}\t", VALID.to_uppercase()),
            VALID.to_string(),
        ] {
            assert!(is_valid(&sanitize(&raw)), "{raw:?} should be valid");
        }
    }

    #[test]
    fn test_every_variant_nibble_accepted() {
        for variant in ['8', '9', 'a', 'b', 'A', 'B'] {
            let code = format!("3f2b8c1e-9d4a-4c6b-{variant}e2f-1a7d5c9b0e34");
            assert!(is_valid(&code), "{code} should be valid");
        }
    }

    #[test]
    fn test_rejects_wrong_version() {
        for version in ['1', '3', '5', 'a'] {
            let code = format!("3f2b8c1e-9d4a-{version}c6b-8e2f-1a7d5c9b0e34");
            assert!(!is_valid(&code), "{code} should be rejected");
        }
    }

    #[test]
    fn test_rejects_wrong_variant() {
        for variant in ['0', '7', 'c', 'f'] {
            let code = format!("3f2b8c1e-9d4a-4c6b-{variant}e2f-1a7d5c9b0e34");
            assert!(!is_valid(&code), "{code} should be rejected");
        }
    }

    #[test]
    fn test_rejects_other_shapes() {
        for code in [
            "",
            "not-a-uuid",
            "3f2b8c1e9d4a4c6b8e2f1a7d5c9b0e34",
            "{3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e34}",
            "urn:uuid:3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e34",
            "3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e3",
            "3f2b8c1e-9d4a-4c6b-8e2f-1a7d5c9b0e345",
            "3f2b8c1g-9d4a-4c6b-8e2f-1a7d5c9b0e34",
            "https://example.com/events/42",
        ] {
            assert!(!is_valid(code), "{code:?} should be rejected");
        }
    }

    #[test]
    fn test_is_valid_does_not_sanitize() {
        assert!(!is_valid(&format!(" {VALID}")));
    }

    #[test]
    fn test_qr_code_parse() {
        let code = QrCode::parse(&format!("  {VALID}\n")).unwrap();
        assert_eq!(code.as_str(), VALID);
        assert_eq!(code.to_string(), VALID);
    }

    #[test]
    fn test_qr_code_parse_error_keeps_raw() {
        let err = QrCode::parse(" nope ").unwrap_err();
        assert_eq!(err.raw, " nope ");
        assert!(err.to_string().contains("invalid QR code"));
    }

    #[test]
    fn test_qr_code_from_str() {
        let code: QrCode = VALID.parse().unwrap();
        assert_eq!(code.as_str(), VALID);
        assert!("bad".parse::<QrCode>().is_err());
    }
}
