use bcrypt::{hash, verify, DEFAULT_COST};
use uuid::Uuid;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

/// False for malformed hashes as well as mismatches.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

/// 64 hex characters from two random v4 UUIDs.
pub fn generate_login_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hashed = hash_password("secret123").unwrap();
        assert!(verify_password("secret123", &hashed));
        assert!(!verify_password("secret124", &hashed));
        assert!(!verify_password("secret123", "not-a-hash"));
    }

    #[test]
    fn login_tokens_are_long_and_distinct() {
        let a = generate_login_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_login_token());
    }
}
