use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_original_password_only() {
        let hash = hash_password("chai-aur-code-2024").expect("hash");
        assert!(verify_password("chai-aur-code-2024", &hash).expect("verify"));
        assert!(!verify_password("chai-aur-code-2025", &hash).expect("verify"));
        assert!(!verify_password("", &hash).expect("verify"));
    }

    #[test]
    fn hashing_salts_each_password() {
        let first = hash_password("same input").expect("hash");
        let second = hash_password("same input").expect("hash");
        assert_ne!(first, second);
        assert!(verify_password("same input", &first).expect("verify"));
        assert!(verify_password("same input", &second).expect("verify"));
    }

    #[test]
    fn unicode_passwords_survive_hashing() {
        let password = "пароль-चाय-☕";
        let hash = hash_password(password).expect("hash");
        assert!(verify_password(password, &hash).expect("verify"));
        // a lookalike with different codepoints must not match
        assert!(!verify_password("пароль-चाय-?", &hash).expect("verify"));
    }

    #[test]
    fn empty_password_hashes_without_matching_others() {
        // length policy lives in the service layer; hashing itself is total
        let hash = hash_password("").expect("hash");
        assert!(verify_password("", &hash).expect("verify"));
        assert!(!verify_password(" ", &hash).expect("verify"));
    }

    #[test]
    fn malformed_stored_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("anything", "$argon2id$corrupted").is_err());
        assert!(verify_password("anything", "").is_err());
    }
}
