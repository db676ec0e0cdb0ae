use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;

pub const PASSWORD_LEN: usize = 12;

/// Random `[A-Za-z0-9]` string of `PASSWORD_LEN` chars.
pub fn generate_password() -> String {
    random_alphanumeric(PASSWORD_LEN)
}

pub fn random_alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 32 hex chars, handed out once with a finished result.
pub fn delete_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill(&mut bytes);
    hex::encode(bytes)
}

/// Equality without an early exit on the first differing byte.
pub fn tokens_match(a: &str, b: &str) -> bool {
    blake3::hash(a.as_bytes()) == blake3::hash(b.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_are_twelve_alphanumerics() {
        let p = generate_password();
        assert_eq!(p.len(), PASSWORD_LEN);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(p, generate_password());
    }

    #[test]
    fn delete_tokens() {
        let t = delete_token();
        assert_eq!(t.len(), 32);
        assert!(tokens_match(&t, &t.clone()));
        assert!(!tokens_match(&t, "0000"));
    }
}
