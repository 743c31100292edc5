use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

use crate::error::KeyError;

/// SHA-256 of `data`, as raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of `data`, hex-encoded (lowercase). Used for every content hash.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Generate a new secp256k1 keypair and return (priv_hex, pub_hex_compressed).
/// The compressed public key hex doubles as the account address.
pub fn generate_keypair_hex() -> (String, String) {
    let secp = Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    (hex::encode(sk.secret_bytes()), hex::encode(pk.serialize()))
}

/// Normalize a hex public key (lowercase, compressed). Fails on garbage.
pub fn normalize_pubkey_hex(pubkey_hex: &str) -> Result<String, KeyError> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| KeyError::Hex)?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| KeyError::Key)?;
    Ok(hex::encode(pk.serialize()))
}

/// True when `pubkey_hex` is already in the form `normalize_pubkey_hex`
/// produces, i.e. usable as an account address as-is.
pub fn is_canonical_pubkey(pubkey_hex: &str) -> bool {
    normalize_pubkey_hex(pubkey_hex).is_ok_and(|n| n == pubkey_hex)
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed)
/// over SHA-256(`message`).
pub fn verify_signature_hex(pubkey_hex: &str, sig_hex: &str, message: &[u8]) -> Result<bool, KeyError> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| KeyError::Hex)?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| KeyError::Signature)?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| KeyError::Hex)?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| KeyError::Key)?;

    let msg = Message::from_digest(sha256(message));
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

/// Keyed BLAKE3 digest of `message`, keyed by the hash of `key_material`.
pub fn keyed_digest(key_material: &[u8], message: &[u8]) -> [u8; 32] {
    let key = blake3::hash(key_material);
    *blake3::keyed_hash(key.as_bytes(), message).as_bytes()
}

/// Local signing identity: used to author reward transactions and to
/// attest new heads.
#[derive(Clone)]
pub struct Identity {
    secret: SecretKey,
    public_key: String,
}

impl Identity {
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(secret_hex.trim()).map_err(|_| KeyError::Hex)?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| KeyError::Key)?;
        let secp = Secp256k1::signing_only();
        let public_key = hex::encode(PublicKey::from_secret_key(&secp, &secret).serialize());
        Ok(Self { secret, public_key })
    }

    /// Fresh random identity.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, pk) = secp.generate_keypair(&mut OsRng);
        Self {
            secret,
            public_key: hex::encode(pk.serialize()),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Sign SHA-256(`message`); returns hex DER.
    pub fn sign(&self, message: &[u8]) -> String {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(sha256(message));
        let der = secp.sign_ecdsa(&msg, &self.secret).serialize_der();
        hex::encode(&der[..])
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let id = Identity::generate();
        let sig = id.sign(b"hello");
        assert_eq!(verify_signature_hex(id.public_key(), &sig, b"hello"), Ok(true));
        assert_eq!(verify_signature_hex(id.public_key(), &sig, b"hellp"), Ok(false));
    }

    #[test]
    fn identity_from_secret_matches_generated_pubkey() {
        let (sk, pk) = generate_keypair_hex();
        let id = Identity::from_secret_hex(&sk).unwrap();
        assert_eq!(id.public_key(), pk);
        assert_eq!(normalize_pubkey_hex(&pk.to_uppercase()), Ok(pk));
    }

    #[test]
    fn only_lowercase_compressed_keys_are_canonical() {
        let id = Identity::generate();
        assert!(is_canonical_pubkey(id.public_key()));
        assert!(!is_canonical_pubkey(&id.public_key().to_uppercase()));
        assert!(!is_canonical_pubkey("not-a-key"));
    }

    #[test]
    fn garbage_inputs_are_errors_not_panics() {
        assert_eq!(verify_signature_hex("02", "zz", b"m"), Err(KeyError::Hex));
        assert_eq!(Identity::from_secret_hex("00").unwrap_err(), KeyError::Key);
    }

    #[test]
    fn keyed_digest_depends_on_key() {
        assert_ne!(keyed_digest(b"a", b"msg"), keyed_digest(b"b", b"msg"));
        assert_eq!(keyed_digest(b"a", b"msg"), keyed_digest(b"a", b"msg"));
    }
}
