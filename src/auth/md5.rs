//! MD5 password authentication
//!
//! Postgres stores MD5 role passwords as `"md5" || md5(password || user)` and,
//! during the exchange, expects `"md5" || md5(stored_hex || salt)`.

use ::md5::{Digest, Md5};

const PREFIX: &str = "md5";

/// Value stored in `pg_authid.rolpassword` for an MD5 role password
pub fn role_password_hash(user: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Response to an AuthenticationMD5Password challenge
pub fn password_message(user: &str, password: &str, salt: [u8; 4]) -> String {
    let stored = role_password_hash(user, password);
    let mut hasher = Md5::new();
    hasher.update(&stored.as_bytes()[PREFIX.len()..]);
    hasher.update(salt);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compare credentials against a stored hash, with or without the `md5` prefix
pub fn matches_stored_hash(user: &str, password: &str, stored: &str) -> bool {
    let computed = role_password_hash(user, password);
    let stored = stored.trim();
    let stored = stored.strip_prefix(PREFIX).unwrap_or(stored);
    computed[PREFIX.len()..].eq_ignore_ascii_case(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_password_hash() {
        // md5("password" || "postgres")
        assert_eq!(
            role_password_hash("postgres", "password"),
            "md532e12f215ba27cb750c9e093ce4b5127"
        );
    }

    #[test]
    fn test_password_message_shape() {
        let msg = password_message("postgres", "password", [1, 2, 3, 4]);
        assert!(msg.starts_with("md5"));
        assert_eq!(msg.len(), 35);
        assert!(msg[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_password_message_depends_on_salt() {
        let a = password_message("postgres", "password", [1, 2, 3, 4]);
        let b = password_message("postgres", "password", [4, 3, 2, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_matches_stored_hash_with_and_without_prefix() {
        assert!(matches_stored_hash(
            "postgres",
            "password",
            "32e12f215ba27cb750c9e093ce4b5127"
        ));
        assert!(matches_stored_hash(
            "postgres",
            "password",
            "md532E12F215BA27CB750C9E093CE4B5127"
        ));
        assert!(!matches_stored_hash("postgres", "wrong", "32e12f215ba27cb750c9e093ce4b5127"));
    }
}
