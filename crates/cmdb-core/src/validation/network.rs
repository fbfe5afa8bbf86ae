//! Network address and port checks.
//!
//! IPv4 addresses must be plain dotted quads: four decimal octets, each in
//! `0..=255`, with no surrounding whitespace, CIDR suffix or port.
//!
//! # Example
//!
//! ```
//! use cmdb_core::validation::{validate_ipv4, validate_port};
//!
//! assert!(validate_ipv4("192.168.1.10").is_ok());
//! assert!(validate_ipv4("192.168.1.256").is_err());
//! assert!(validate_port(65535).is_ok());
//! assert!(validate_port(0).is_err());
//! ```

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Lowest accepted port number.
pub const MIN_PORT: i64 = 1;

/// Highest accepted port number.
pub const MAX_PORT: i64 = 65535;

static IPV4_RE: OnceLock<Regex> = OnceLock::new();

fn ipv4_regex() -> &'static Regex {
    IPV4_RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$")
            .expect("Invalid IPv4 pattern")
    })
}

/// Errors produced by the network checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkValidationError {
    /// The value is not four dot-separated decimal groups.
    #[error("'{0}' is not a valid IPv4 address")]
    MalformedIpv4(String),

    /// One octet is larger than 255.
    #[error("'{address}' has octet {octet} out of range 0-255")]
    OctetOutOfRange { address: String, octet: String },

    /// The port is outside `1..=65535`.
    #[error("port {0} is out of range {MIN_PORT}-{MAX_PORT}")]
    PortOutOfRange(i64),
}

/// Validates a dotted-quad IPv4 address.
pub fn validate_ipv4(value: &str) -> Result<(), NetworkValidationError> {
    let caps = ipv4_regex()
        .captures(value)
        .ok_or_else(|| NetworkValidationError::MalformedIpv4(value.to_string()))?;

    for group in caps.iter().skip(1).flatten() {
        let octet = group.as_str();
        match octet.parse::<u16>() {
            Ok(n) if n <= 255 => {}
            _ => {
                return Err(NetworkValidationError::OctetOutOfRange {
                    address: value.to_string(),
                    octet: octet.to_string(),
                })
            }
        }
    }

    Ok(())
}

/// Validates that a port lies in `1..=65535`.
pub fn validate_port(port: i64) -> Result<(), NetworkValidationError> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(())
    } else {
        Err(NetworkValidationError::PortOutOfRange(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ipv4() {
        for ip in ["0.0.0.0", "127.0.0.1", "10.20.30.40", "255.255.255.255"] {
            assert!(validate_ipv4(ip).is_ok(), "{} should be valid", ip);
        }
    }

    #[test]
    fn test_malformed_ipv4() {
        for ip in ["", "1.2.3", "1.2.3.4.5", "a.b.c.d", " 1.2.3.4", "1.2.3.4/24", "1.2.3.4:22"] {
            assert!(
                matches!(
                    validate_ipv4(ip),
                    Err(NetworkValidationError::MalformedIpv4(_))
                ),
                "{} should be malformed",
                ip
            );
        }
    }

    #[test]
    fn test_octet_out_of_range() {
        let err = validate_ipv4("10.0.0.256").unwrap_err();
        assert_eq!(
            err,
            NetworkValidationError::OctetOutOfRange {
                address: "10.0.0.256".into(),
                octet: "256".into()
            }
        );
        assert!(validate_ipv4("999.1.1.1").is_err());
    }

    #[test]
    fn test_port_bounds() {
        assert!(validate_port(1).is_ok());
        assert!(validate_port(65535).is_ok());
        assert_eq!(
            validate_port(0),
            Err(NetworkValidationError::PortOutOfRange(0))
        );
        assert!(validate_port(65536).is_err());
        assert!(validate_port(-22).is_err());
    }
}
