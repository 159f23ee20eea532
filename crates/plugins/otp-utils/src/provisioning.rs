//! `otpauth://` URIs for enrolling a secret in an authenticator app.

use twostep_core::Secret;

use crate::generator::TotpOptions;

/// TOTP URI for QR code generation.
#[derive(Debug, Clone)]
pub struct TotpUri {
    /// The complete TOTP URI.
    pub uri: String,
    /// The secret in base32 format.
    pub secret: String,
}

/// Builds the key URI understood by common authenticator apps.
pub fn provisioning_uri(
    issuer: &str,
    account: &str,
    secret: &Secret,
    options: &TotpOptions,
) -> TotpUri {
    let encoded_secret = secret.to_base32();
    let uri = format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        percent_encode(issuer),
        percent_encode(account),
        encoded_secret,
        percent_encode(issuer),
        options.digits,
        options.period
    );

    TotpUri {
        uri,
        secret: encoded_secret,
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_generation() {
        let secret = Secret::from_base32("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
        let uri = provisioning_uri("My App", "alice@example.com", &secret, &TotpOptions::default());

        assert!(uri.uri.starts_with("otpauth://totp/My%20App:alice%40example.com?"));
        assert!(uri.uri.contains("secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"));
        assert!(uri.uri.contains("digits=6&period=30"));
        assert_eq!(uri.secret, "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
    }

    #[test]
    fn test_non_ascii_is_encoded_per_byte() {
        assert_eq!(percent_encode("é"), "%C3%A9");
    }
}
