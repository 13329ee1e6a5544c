use rand::{distributions::Alphanumeric, thread_rng, Rng};
use subtle::ConstantTimeEq;

pub const ACCESS_TOKEN_LENGTH: usize = 32;

pub fn generate_access_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Compares a presented token with the stored one without leaking how many
/// leading bytes matched.
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_alphanumeric() {
        let token = generate_access_token(ACCESS_TOKEN_LENGTH);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_access_token(ACCESS_TOKEN_LENGTH));
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc124", "abc123"));
        assert!(!tokens_match("abc", "abc123"));
    }
}
