//! Message authenticator for state-changing requests.
//!
//! A client signs `decimal(nonce) || arg0 || arg1 || ...` with a P-256 key and
//! sends a [`Message`] envelope (base64 of JSON) alongside the request. The
//! server verifies the signature against the request's own arguments and
//! derives the sender's account address. Nonce replay protection is *not*
//! done here: the contract rejects any nonce that is not the account's next
//! expected value.
//!
//! Argument order is part of what is signed; client and server must agree on it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::spki::SubjectPublicKeyInfoRef;
use p256::pkcs8::{AssociatedOid, DecodePublicKey, ObjectIdentifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use crate::error::AuthError;
use crate::types::base64_bytes;

/// `id-ecPublicKey` from RFC 5480.
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Authentication envelope for a single state-changing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub nonce: u64,
    /// DER-encoded SubjectPublicKeyInfo.
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// ASN.1 DER ECDSA signature over [`payload_digest`].
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl Message {
    /// JSON encoding, as passed to the contract.
    pub fn marshal(&self) -> Result<String, AuthError> {
        serde_json::to_string(self).map_err(|e| AuthError::NotAMessage(e.to_string()))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, AuthError> {
        serde_json::from_slice(bytes).map_err(|e| AuthError::NotAMessage(e.to_string()))
    }

    /// Decode the transport form: base64 (standard alphabet) of the JSON encoding.
    pub fn from_base64_str(s: &str) -> Result<Self, AuthError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| AuthError::NotAMessage(e.to_string()))?;
        Self::unmarshal(&bytes)
    }

    /// Encode into the transport form.
    pub fn to_base64_string(&self) -> Result<String, AuthError> {
        Ok(STANDARD.encode(self.marshal()?))
    }

    /// Verify the signature against `args` and return the sender's address.
    pub fn verify_against_args<S: AsRef<str>>(&self, args: &[S]) -> Result<String, AuthError> {
        verify(self, args)
    }
}

/// Canonical signed bytes: the decimal nonce followed by each argument in order.
pub fn payload<S: AsRef<str>>(nonce: u64, args: &[S]) -> Vec<u8> {
    let mut out = nonce.to_string().into_bytes();
    for arg in args {
        out.extend_from_slice(arg.as_ref().as_bytes());
    }
    out
}

/// SHA-256 of [`payload`]; this is the prehash the signature covers.
pub fn payload_digest<S: AsRef<str>>(nonce: u64, args: &[S]) -> [u8; 32] {
    Sha256::digest(payload(nonce, args)).into()
}

/// Verify `msg` against the request arguments and return the sender address.
///
/// Pure: no nonce bookkeeping, no authorization of the address.
pub fn verify<S: AsRef<str>>(msg: &Message, args: &[S]) -> Result<String, AuthError> {
    let key = parse_public_key(&msg.public_key)?;
    let sender = derive_address(&key);

    let signature =
        Signature::from_der(&msg.signature).map_err(|_| AuthError::InvalidSignature)?;
    let digest = payload_digest(msg.nonce, args);
    key.verify_prehash(&digest, &signature)
        .map_err(|_| AuthError::InvalidSignature)?;

    Ok(sender)
}

/// Parse a DER SubjectPublicKeyInfo. Only P-256 EC keys are accepted.
pub fn parse_public_key(der: &[u8]) -> Result<VerifyingKey, AuthError> {
    let spki = SubjectPublicKeyInfoRef::try_from(der)
        .map_err(|e| AuthError::InvalidMessage(e.to_string()))?;
    if spki.algorithm.oid != EC_PUBLIC_KEY_OID {
        return Err(AuthError::AlgorithmNotSupported);
    }
    match spki.algorithm.parameters_oid() {
        Ok(curve) if curve == p256::NistP256::OID => {}
        _ => return Err(AuthError::AlgorithmNotSupported),
    }
    VerifyingKey::from_public_key_der(der).map_err(|e| AuthError::InvalidMessage(e.to_string()))
}

/// Account address for a public key: `0x` + last 20 bytes of the Keccak-256
/// hash of the uncompressed SEC1 point.
pub fn derive_address(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let mut hasher = Keccak::v256();
    hasher.update(point.as_bytes());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Address for DER SubjectPublicKeyInfo bytes.
pub fn address_from_der(der: &[u8]) -> Result<String, AuthError> {
    parse_public_key(der).map(|k| derive_address(&k))
}

#[cfg(test)]
pub(crate) mod testkit {
    //! Deterministic signing helpers shared by tests in this crate.

    use super::*;
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::ecdsa::SigningKey;
    use p256::pkcs8::EncodePublicKey;

    pub fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    pub fn public_key_der(key: &SigningKey) -> Vec<u8> {
        key.verifying_key()
            .to_public_key_der()
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    pub fn sign(key: &SigningKey, nonce: u64, args: &[&str]) -> Message {
        let digest = payload_digest(nonce, args);
        let sig: Signature = key.sign_prehash(&digest).unwrap();
        Message {
            nonce,
            public_key: public_key_der(key),
            signature: sig.to_der().as_bytes().to_vec(),
        }
    }
}
