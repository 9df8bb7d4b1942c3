//! Device identifier parsing.
//!
//! A device id has the form `<scheme>:<id>[/<service>]` where scheme is one
//! of `mac`, `uuid`, `dns` or `serial` (case-insensitive). Parsing yields the
//! canonical `<scheme>:<id>` form: the scheme is lowercased, any trailing
//! service segment is dropped, and for `mac` ids the `:-.,` delimiters are
//! stripped and exactly 12 hex digits must remain.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEMES: [&str; 4] = ["mac", "uuid", "dns", "serial"];
const MAC_DELIMITERS: [char; 4] = [':', '-', '.', ','];
const MAC_LENGTH: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("invalid device id {0:?}")]
    Invalid(String),
}

/// Canonical device identifier, used as the leading segment of a WRP
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(raw: &str) -> Result<Self, DeviceIdError> {
        let invalid = || DeviceIdError::Invalid(raw.to_string());

        let (scheme, rest) = raw.split_once(':').ok_or_else(invalid)?;
        let scheme = scheme.to_ascii_lowercase();
        if !SCHEMES.contains(&scheme.as_str()) {
            return Err(invalid());
        }

        let id = rest.split('/').next().unwrap_or_default();
        if id.is_empty() {
            return Err(invalid());
        }

        let id = if scheme == "mac" {
            let digits: String = id.chars().filter(|c| !MAC_DELIMITERS.contains(c)).collect();
            if digits.len() != MAC_LENGTH || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            digits
        } else {
            id.to_string()
        };

        Ok(Self(format!("{scheme}:{id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac_keeps_digits() {
        let id = DeviceId::parse("mac:AABBCCDDEEFF").unwrap();
        assert_eq!(id.as_str(), "mac:AABBCCDDEEFF");
    }

    #[test]
    fn test_parse_mac_strips_delimiters() {
        let id = DeviceId::parse("MAC:11:22:33-44.55,66").unwrap();
        assert_eq!(id.as_str(), "mac:112233445566");
    }

    #[test]
    fn test_parse_drops_service_segment() {
        let id = DeviceId::parse("mac:112233445566/config").unwrap();
        assert_eq!(id.to_string(), "mac:112233445566");
    }

    #[test]
    fn test_parse_other_schemes() {
        assert_eq!(
            DeviceId::parse("uuid:a-b-c").unwrap().as_str(),
            "uuid:a-b-c"
        );
        assert_eq!(
            DeviceId::parse("Serial:ABC123").unwrap().as_str(),
            "serial:ABC123"
        );
        assert_eq!(
            DeviceId::parse("dns:device.example.com").unwrap().as_str(),
            "dns:device.example.com"
        );
    }

    #[test]
    fn test_parse_rejects_bad_mac() {
        assert!(DeviceId::parse("mac:1122334455").is_err());
        assert!(DeviceId::parse("mac:11223344556G").is_err());
        assert!(DeviceId::parse("mac:1122334455667788").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_scheme_or_empty_id() {
        assert!(DeviceId::parse("imei:112233445566").is_err());
        assert!(DeviceId::parse("112233445566").is_err());
        assert!(DeviceId::parse("mac:").is_err());
        assert!(DeviceId::parse("serial:/config").is_err());
    }
}
