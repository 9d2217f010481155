use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

const TOKEN_BYTES: usize = 16;

/// Random value identifying one acquisition of a lock.
///
/// 128 bits from the operating system's CSPRNG, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnershipToken(String);

impl OwnershipToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        OwnershipToken(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OwnershipToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_is_128_bit_hex() {
        let token = OwnershipToken::generate();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_not_reused() {
        let tokens: HashSet<_> = (0..1000).map(|_| OwnershipToken::generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
