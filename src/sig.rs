//! Creation and verification of (Ethereum-style) signatures over channel
//! states.
//!
//! Signatures are recoverable secp256k1 signatures over the Keccak-256 digest
//! of the canonical state encoding, with the `\x19Ethereum Signed Message`
//! prefix applied before signing. Using the Ethereum personal-message
//! convention keeps the signatures verifiable by the EVM side of a
//! cross-chain channel.

use crate::error::ValidationError;
use core::fmt::Debug;
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as K256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha3::{Digest, Keccak256};

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }
    };
}

/// 32-byte Keccak-256 digest.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Hash(pub [u8; 32]);
impl_hex_debug!(Hash);

/// Uncompressed SEC1 secp256k1 public key (`0x04 || x || y`).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct PubKey(pub [u8; 65]);
impl_hex_debug!(PubKey);

impl PubKey {
    /// Parses and validates a public key, rejecting bytes that are not a
    /// point on the curve.
    pub fn from_bytes(bytes: &[u8; 65]) -> Result<Self, ValidationError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|_| ValidationError::InvalidParameters("public key is not on the curve"))?;
        Ok(Self(*bytes))
    }
}

impl From<VerifyingKey> for PubKey {
    fn from(key: VerifyingKey) -> Self {
        // The uncompressed encoding is 65 bytes; if that ever changes in the
        // dependency its contents will have changed too.
        let bytes: [u8; 65] = key.to_encoded_point(false).as_bytes().try_into().unwrap();
        Self(bytes)
    }
}

/// 65-byte recoverable signature `r || s || v`, with `v` in Ethereum form
/// (27/28).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Sig(pub [u8; 65]);
impl_hex_debug!(Sig);

impl Sig {
    /// Rejects any slice that is not exactly 65 bytes. There is no silent
    /// truncation or padding of signatures.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let bytes: [u8; 65] = bytes
            .try_into()
            .map_err(|_| ValidationError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> Hash {
    Hash(Keccak256::digest(data).into())
}

/// Add the `\x19Ethereum Signed Message:\n<length>` prefix to hash.
///
/// This is the format expected by the EVM-side contracts.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Off-chain signing identity, holding the secp256k1 key used for channel
/// state signatures.
#[derive(Debug, Clone)]
pub struct Signer {
    key: SigningKey,
    pub_key: PubKey,
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let key = SigningKey::random(rng);
        let pub_key = key.verifying_key().into();
        Self { key, pub_key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, ValidationError> {
        let key = SigningKey::from_bytes(bytes)
            .map_err(|_| ValidationError::InvalidParameters("invalid secp256k1 private key"))?;
        let pub_key = key.verifying_key().into();
        Ok(Self { key, pub_key })
    }

    pub fn public_key(&self) -> PubKey {
        self.pub_key
    }

    /// Signs a 32-byte digest under the Ethereum personal-message convention.
    pub fn sign_eth(&self, msg: Hash) -> Sig {
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature = self.key.sign_prehash(&hash.0).unwrap();

        // The recoverable signature already has the 65-byte r || s || v
        // layout, but v must be shifted by 27 to be valid in the EVM.
        let mut sig_bytes: [u8; 65] = sig.as_bytes().try_into().expect(
            "Unreachable: Signature size doesn't match, something big must have changed in the dependency",
        );
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += 27;

        Sig(sig_bytes)
    }
}

/// Recovers the public key that signed `msg`.
///
/// Returns `None` for any malformed signature (bad recovery id, r/s out of
/// range); recovery never panics or errors.
pub fn recover(msg: Hash, sig: &Sig) -> Option<PubKey> {
    let hash = hash_to_eth_signed_msg_hash(msg);

    let mut sig_bytes: [u8; 65] = sig.0;
    sig_bytes[64] = sig_bytes[64].checked_sub(27)?;

    let sig = recoverable::Signature::from_bytes(&sig_bytes).ok()?;
    let verifying_key = sig
        .recover_verifying_key_from_digest_bytes(&hash.0.into())
        .ok()?;
    Some(verifying_key.into())
}

/// Checks that `sig` is a signature over `msg` by `pub_key`. Malformed
/// signatures yield `false`, never an error.
pub fn verify(msg: Hash, sig: &Sig, pub_key: &PubKey) -> bool {
    match recover(msg, sig) {
        Some(recovered) => recovered == *pub_key,
        None => false,
    }
}
