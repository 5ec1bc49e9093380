use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use once_cell::sync::Lazy;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(password: &str, hashed: &str) -> Result<(), argon2::password_hash::Error> {
    let argon2 = Argon2::default();
    let parsed = PasswordHash::new(hashed)?;

    argon2.verify_password(password.as_bytes(), &parsed)
}

// Same parameters as real hashes, so verifying against it costs the same.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| hash_password("teamhub-unknown-account").unwrap_or_default());

/// Runs a full verify for logins that have no usable account, keeping response time uniform.
pub fn verify_dummy(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Sup3rSecret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Sup3rSecret", &hash).is_ok());
        assert!(verify_password("sup3rsecret", &hash).is_err());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(
            hash_password("Sup3rSecret").unwrap(),
            hash_password("Sup3rSecret").unwrap()
        );
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_panic() {
        assert!(verify_password("whatever", "not-a-phc-string").is_err());
    }

    #[test]
    fn dummy_verify_uses_a_real_argon2_hash() {
        assert!(DUMMY_HASH.starts_with("$argon2"));
        assert!(PasswordHash::new(&DUMMY_HASH).is_ok());
        verify_dummy("Sup3rSecret");
    }
}
