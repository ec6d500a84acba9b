//! Curve25519 key pairs held by a device.

use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// A Curve25519 key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public: [u8; 32],
    pub private: [u8; 32],
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let mut private = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut private);

        private[0] &= 248;
        private[31] &= 127;
        private[31] |= 64;

        Self::from_private_key(private)
    }

    /// Rebuild a key pair from its private half.
    pub fn from_private_key(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);

        Self {
            public: *public.as_bytes(),
            private,
        }
    }

    /// Rebuild from a stored private key, which must be exactly 32 bytes.
    pub fn from_slice(private: &[u8]) -> Option<Self> {
        let private: [u8; 32] = private.try_into().ok()?;
        Some(Self::from_private_key(private))
    }

    /// Short hex prefix of the public key, for log lines.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.public[..8])
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .field("private", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_from_private_key() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_slice(&kp.private).unwrap();
        assert_eq!(restored, kp);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(KeyPair::from_slice(&[1u8; 31]).is_none());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let kp = KeyPair::generate();
        let debug = format!("{kp:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&hex::encode(kp.private)));
    }
}
