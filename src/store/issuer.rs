//! Referral code generation for new members.

use crate::domain::ReferralCode;
use sha2::{Digest, Sha256};
use std::fmt;

/// Produces referral codes. Uniqueness is enforced by the store; callers retry on clash.
pub trait ReferralCodeIssuer: Send + Sync + fmt::Debug {
    fn generate(&self) -> ReferralCode;
}

/// Hashes a random UUID and keeps a short uppercase hex prefix.
#[derive(Debug, Clone)]
pub struct HashCodeIssuer {
    length: usize,
}

impl HashCodeIssuer {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(4, 64),
        }
    }
}

impl Default for HashCodeIssuer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ReferralCodeIssuer for HashCodeIssuer {
    fn generate(&self) -> ReferralCode {
        let mut hasher = Sha256::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let digest = hex::encode_upper(hasher.finalize());
        ReferralCode::new(digest[..self.length].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_have_requested_length_and_are_hex() {
        let issuer = HashCodeIssuer::new(8);
        let code = issuer.generate();
        assert_eq!(code.as_str().len(), 8);
        assert!(code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_codes_are_distinct() {
        let issuer = HashCodeIssuer::default();
        let codes: HashSet<_> = (0..200).map(|_| issuer.generate()).collect();
        assert_eq!(codes.len(), 200);
    }
}
