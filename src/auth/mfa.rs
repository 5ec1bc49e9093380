//! Time-based one-time passwords (RFC 6238) for the second login step.
//!
//! HMAC-SHA1, 30 second steps, 6 digits, one step of clock skew tolerated on
//! either side. Secrets are 20 random bytes carried as unpadded base32.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const STEP_SECS: u64 = 30;
pub const DIGITS: u32 = 6;
pub const SKEW_STEPS: u64 = 1;
const SECRET_LEN: usize = 20;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

/// Decodes base32, ignoring case, spaces and `=` padding. `None` on any other character.
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET.iter().position(|&a| a == upper)? as u64;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }

    Some(out)
}

/// Fresh random secret, base32 encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    OsRng.fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// Provisioning URI understood by authenticator apps.
pub fn otpauth_url(issuer: &str, account: &str, secret: &str) -> String {
    let issuer_enc = urlencoding::encode(issuer);
    format!(
        "otpauth://totp/{issuer_enc}:{}?secret={secret}&issuer={issuer_enc}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECS}",
        urlencoding::encode(account),
    )
}

pub fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(hash[offset] & 0x7f) << 24)
        | (u32::from(hash[offset + 1]) << 16)
        | (u32::from(hash[offset + 2]) << 8)
        | u32::from(hash[offset + 3]);

    Some(binary % 10u32.pow(DIGITS))
}

pub fn time_step(unix_secs: u64) -> u64 {
    unix_secs / STEP_SECS
}

pub fn totp_at(key: &[u8], unix_secs: u64) -> Option<String> {
    hotp(key, time_step(unix_secs)).map(|code| format!("{code:0width$}", width = DIGITS as usize))
}

/// Checks `code` against the steps around `unix_secs`.
/// Returns the matching time step so callers can refuse to accept it twice.
pub fn verify_code(secret_b32: &str, code: &str, unix_secs: u64) -> Option<u64> {
    let key = base32_decode(secret_b32)?;
    if key.is_empty() {
        return None;
    }

    let current = time_step(unix_secs);
    let first = current.saturating_sub(SKEW_STEPS);

    (first..=current + SKEW_STEPS).find(|&step| {
        hotp(&key, step)
            .map(|expected| format!("{expected:0width$}", width = DIGITS as usize))
            .is_some_and(|expected| constant_time_eq(expected.as_bytes(), code.as_bytes()))
    })
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

    // RFC 6238 appendix B seed for SHA1
    const RFC_SEED: &[u8] = b"12345678901234567890";

    #[test]
    fn rfc6238_sha1_vectors_truncated_to_six_digits() {
        assert_eq!(totp_at(RFC_SEED, 59).unwrap(), "287082");
        assert_eq!(totp_at(RFC_SEED, 1_111_111_109).unwrap(), "081804");
        assert_eq!(totp_at(RFC_SEED, 1_234_567_890).unwrap(), "005924");
        assert_eq!(totp_at(RFC_SEED, 2_000_000_000).unwrap(), "279037");
    }

    #[test]
    fn base32_known_value() {
        assert_eq!(base32_encode(RFC_SEED), "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
        assert_eq!(
            base32_decode("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap(),
            RFC_SEED
        );
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_decode("MY======").unwrap(), b"f");
        assert!(base32_decode("not base32!").is_none());
    }

    #[test]
    fn generated_secrets_decode_to_twenty_bytes() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).unwrap().len(), 20);
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn one_step_of_skew_is_tolerated() {
        let secret = base32_encode(RFC_SEED);
        let t = 1_234_567_890;
        let code = totp_at(RFC_SEED, t).unwrap();

        assert_eq!(verify_code(&secret, &code, t), Some(time_step(t)));
        assert!(verify_code(&secret, &code, t + STEP_SECS).is_some());
        assert!(verify_code(&secret, &code, t - STEP_SECS).is_some());
        assert!(verify_code(&secret, &code, t + 3 * STEP_SECS).is_none());
        assert!(verify_code(&secret, &code, t - 3 * STEP_SECS).is_none());
    }

    #[test]
    fn wrong_code_and_bad_secret_fail() {
        let secret = base32_encode(RFC_SEED);
        assert!(verify_code(&secret, "000000", 59).is_none());
        assert!(verify_code("!!!", "287082", 59).is_none());
        assert!(verify_code("", "287082", 59).is_none());
    }

    #[test]
    fn provisioning_url_escapes_the_account() {
        let url = otpauth_url("TeamHub", "ana@teamhub.io", "ABC");
        assert_eq!(
            url,
            "otpauth://totp/TeamHub:ana%40teamhub.io?secret=ABC&issuer=TeamHub&algorithm=SHA1&digits=6&period=30"
        );
    }
}
