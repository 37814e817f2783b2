//! RFC 6238 time-based one-time codes (HMAC-SHA1, 6 digits, 30 s step)
//!
//! Secrets are base32 (RFC 4648, unpadded) so any authenticator app can
//! import them from the provisioning URI.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, Zeroizing};

type HmacSha1 = Hmac<Sha1>;

/// Digits per code
pub const DIGITS: u32 = 6;

/// Time step in seconds
pub const STEP_SECS: u64 = 30;

/// Raw secret size (160-bit, the RFC 4226 recommendation)
pub const SECRET_BYTES: usize = 20;

/// Accepted clock skew, in steps, on each side of the current step
pub const SKEW_STEPS: u64 = 1;

/// Generate a fresh base32 secret from the OS CSPRNG.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let secret = BASE32_NOPAD.encode(&bytes);
    bytes.zeroize();
    secret
}

/// Build the `otpauth://` URI an authenticator app (or QR renderer) consumes.
///
/// Issuer and label are percent-encoded; the secret is embedded verbatim.
pub fn provisioning_uri(secret: &str, account_label: &str, issuer: &str) -> String {
    let issuer = urlencoding::encode(issuer);
    let label = urlencoding::encode(account_label);
    format!(
        "otpauth://totp/{issuer}:{label}?secret={secret}&issuer={issuer}&digits={DIGITS}&period={STEP_SECS}"
    )
}

/// Check `code` against the steps around `now` (unix seconds).
///
/// Malformed secrets and codes are rejected, never an error. There is no
/// attempt counter; every call is independent.
pub fn validate(secret: &str, code: &str, now: u64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let key = match decode_secret(secret) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!("rejecting code: {e}");
            return false;
        }
    };

    let step = now / STEP_SECS;
    let first = step.saturating_sub(SKEW_STEPS);
    let last = step.saturating_add(SKEW_STEPS);

    // Evaluate every step so timing does not reveal which one matched
    (first..=last).fold(false, |matched, counter| {
        let ok = match hotp(&key, counter) {
            Ok(expected) => constant_time_eq(format_code(expected).as_bytes(), code.as_bytes()),
            Err(_) => false,
        };
        matched | ok
    })
}

/// The code for the step containing `now`.
pub fn code_at(secret: &str, now: u64) -> anyhow::Result<String> {
    let key = decode_secret(secret)?;
    Ok(format_code(hotp(&key, now / STEP_SECS)?))
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Decode a base32 secret, tolerating spaces, padding and lowercase.
pub fn decode_secret(secret: &str) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let normalized: Zeroizing<String> = Zeroizing::new(
        secret
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    );
    if normalized.is_empty() {
        anyhow::bail!("TOTP secret is empty");
    }
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("TOTP secret is not valid base32: {e}"))
}

/// RFC 4226 HOTP with dynamic truncation.
fn hotp(key: &[u8], counter: u64) -> anyhow::Result<u32> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("HMAC key rejected: {e}"))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Ok(binary % 10u32.pow(DIGITS))
}

fn format_code(value: u32) -> String {
    format!("{:0width$}", value, width = DIGITS as usize)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// base32("12345678901234567890"), the RFC 6238 appendix B SHA-1 seed
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_vectors() {
        // Appendix B values, truncated to 6 digits
        let vectors = [
            (59u64, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
            (20_000_000_000, "353130"),
        ];
        for (time, expected) in vectors {
            assert_eq!(code_at(RFC_SECRET, time).unwrap(), expected, "T={time}");
            assert!(validate(RFC_SECRET, expected, time), "T={time}");
        }
    }

    #[test]
    fn test_generated_secrets_differ_and_decode() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b, "random secrets must differ");
        assert_eq!(decode_secret(&a).unwrap().len(), SECRET_BYTES);
        assert_eq!(decode_secret(&b).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn test_adjacent_steps_accepted() {
        let now = 1_700_000_000;
        let prev = code_at(RFC_SECRET, now - STEP_SECS).unwrap();
        let next = code_at(RFC_SECRET, now + STEP_SECS).unwrap();
        assert!(validate(RFC_SECRET, &prev, now));
        assert!(validate(RFC_SECRET, &next, now));
    }

    #[test]
    fn test_distant_steps_rejected() {
        // Valid at T=1111111111, hundreds of millions of steps away from T=59
        assert!(!validate(RFC_SECRET, "050471", 59));
        assert!(!validate(RFC_SECRET, "287082", 1_111_111_111));
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let now = 59;
        assert!(!validate(RFC_SECRET, "", now));
        assert!(!validate(RFC_SECRET, "28708", now));
        assert!(!validate(RFC_SECRET, "2870820", now));
        assert!(!validate(RFC_SECRET, "28708a", now));
        assert!(validate(RFC_SECRET, " 287082\n", now));
    }

    #[test]
    fn test_malformed_secret_rejected() {
        assert!(!validate("", "287082", 59));
        assert!(!validate("not base32!", "287082", 59));
        assert!(code_at("", 59).is_err());
    }

    #[test]
    fn test_secret_normalization() {
        let spaced = "gezd gnbv gy3t qojq gezd gnbv gy3t qojq";
        assert_eq!(code_at(spaced, 59).unwrap(), "287082");
    }

    #[test]
    fn test_provisioning_uri_shape() {
        let uri = provisioning_uri(RFC_SECRET, "FolderLocker", "BMachine");
        assert_eq!(
            uri,
            format!(
                "otpauth://totp/BMachine:FolderLocker?secret={RFC_SECRET}&issuer=BMachine&digits=6&period=30"
            )
        );
    }

    #[test]
    fn test_provisioning_uri_parses_back() {
        let secret = generate_secret();
        let uri = provisioning_uri(&secret, "user", "issuer");
        assert!(uri.contains(&secret));

        let parsed = url::Url::parse(&uri).unwrap();
        assert_eq!(parsed.scheme(), "otpauth");
        assert_eq!(parsed.host_str(), Some("totp"));
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("secret"), Some(&secret));
        assert_eq!(pairs.get("issuer").map(String::as_str), Some("issuer"));
        assert_eq!(pairs.get("digits").map(String::as_str), Some("6"));
    }

    #[test]
    fn test_provisioning_uri_encodes_label() {
        let uri = provisioning_uri("ABC", "Jo Doe", "My Co");
        assert!(uri.starts_with("otpauth://totp/My%20Co:Jo%20Doe?"), "got: {uri}");
        assert!(uri.contains("&issuer=My%20Co&"));
    }
}
