//! P-256 key agreement for Web Push subscriptions.
//!
//! Every subscription owns one key pair plus a 16-byte auth secret. The public
//! key and auth secret are handed to the instance at registration; the private
//! key and auth secret are persisted so a later request can decrypt.

use aes_gcm::aead::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use push_types::{KeyMaterial, AUTH_SECRET_SIZE};
use zeroize::Zeroizing;

use crate::error::EceError;

/// Size of a P-256 private scalar in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of an uncompressed SEC1 P-256 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Size of the raw ECDH shared secret in bytes.
pub const SHARED_SECRET_SIZE: usize = 32;

/// Freshly generated subscription keys.
#[derive(Debug)]
pub struct GeneratedKeys {
    /// Uncompressed public key, sent to the instance as `p256dh`.
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Private key and auth secret, persisted with the subscription.
    pub material: KeyMaterial,
}

impl GeneratedKeys {
    /// The auth secret, sent to the instance as `auth`.
    pub fn auth_secret(&self) -> &[u8] {
        self.material.auth_secret()
    }
}

/// Generate a new P-256 key pair and auth secret from the OS CSPRNG.
pub fn generate() -> Result<GeneratedKeys, EceError> {
    let secret = SecretKey::random(&mut OsRng);

    let mut auth_secret = vec![0u8; AUTH_SECRET_SIZE];
    getrandom::getrandom(&mut auth_secret).map_err(|e| EceError::InvalidKey(e.to_string()))?;

    let public_key = encode_public(&secret.public_key());
    let private_key = secret.to_bytes().to_vec();

    Ok(GeneratedKeys {
        public_key,
        material: KeyMaterial::new(private_key, auth_secret),
    })
}

/// Recompute the uncompressed public key for a stored private key.
pub fn public_key_of(private_key: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE], EceError> {
    let secret = parse_private_key(private_key)?;
    Ok(encode_public(&secret.public_key()))
}

/// Raw ECDH shared secret (the x-coordinate) between our private key and a peer.
///
/// Fails with [`EceError::InvalidKey`] if either key is malformed or the peer
/// point is not on P-256.
pub fn derive_shared_secret(
    private_key: &[u8],
    peer_public_key: &[u8],
) -> Result<Zeroizing<[u8; SHARED_SECRET_SIZE]>, EceError> {
    let secret = parse_private_key(private_key)?;
    let peer = parse_public_key(peer_public_key)?;

    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let mut out = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(out)
}

pub(crate) fn parse_private_key(bytes: &[u8]) -> Result<SecretKey, EceError> {
    if bytes.len() != PRIVATE_KEY_SIZE {
        return Err(EceError::InvalidKey(format!(
            "private key must be {PRIVATE_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    SecretKey::from_slice(bytes).map_err(|_| EceError::InvalidKey("private key out of range".into()))
}

pub(crate) fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, EceError> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(EceError::InvalidKey(format!(
            "public key must be {PUBLIC_KEY_SIZE} uncompressed bytes, got {}",
            bytes.len()
        )));
    }
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| EceError::InvalidKey("public key is not a P-256 point".into()))
}

pub(crate) fn encode_public(public: &PublicKey) -> [u8; PUBLIC_KEY_SIZE] {
    let point = public.to_encoded_point(false);
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out.copy_from_slice(point.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_web_push_sizes() {
        let keys = generate().unwrap();
        assert_eq!(keys.public_key[0], 0x04, "uncompressed SEC1 prefix");
        assert_eq!(keys.material.private_key().len(), PRIVATE_KEY_SIZE);
        assert_eq!(keys.auth_secret().len(), AUTH_SECRET_SIZE);
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        assert_ne!(a.public_key, b.public_key);
        assert_ne!(a.auth_secret(), b.auth_secret());
    }

    #[test]
    fn public_key_recomputed_from_private() {
        let keys = generate().unwrap();
        let recomputed = public_key_of(keys.material.private_key()).unwrap();
        assert_eq!(recomputed, keys.public_key);
    }

    #[test]
    fn shared_secret_agrees_both_ways() {
        let alice = generate().unwrap();
        let bob = generate().unwrap();

        let ab = derive_shared_secret(alice.material.private_key(), &bob.public_key).unwrap();
        let ba = derive_shared_secret(bob.material.private_key(), &alice.public_key).unwrap();

        assert_eq!(*ab, *ba);
    }

    #[test]
    fn shared_secret_rejects_off_curve_peer() {
        let keys = generate().unwrap();
        let mut bogus = [0u8; PUBLIC_KEY_SIZE];
        bogus[0] = 0x04;
        bogus[1] = 1;

        let result = derive_shared_secret(keys.material.private_key(), &bogus);
        assert!(matches!(result, Err(EceError::InvalidKey(_))));
    }

    #[test]
    fn shared_secret_rejects_compressed_peer() {
        let keys = generate().unwrap();
        let peer = generate().unwrap();
        let compressed = parse_public_key(&peer.public_key)
            .unwrap()
            .to_encoded_point(true);

        let result = derive_shared_secret(keys.material.private_key(), compressed.as_bytes());
        assert!(matches!(result, Err(EceError::InvalidKey(_))));
    }

    #[test]
    fn shared_secret_rejects_short_private_key() {
        let peer = generate().unwrap();
        let result = derive_shared_secret(&[1u8; 16], &peer.public_key);
        assert!(matches!(result, Err(EceError::InvalidKey(_))));
    }

    #[test]
    fn zero_private_key_is_rejected() {
        assert!(public_key_of(&[0u8; PRIVATE_KEY_SIZE]).is_err());
    }
}
