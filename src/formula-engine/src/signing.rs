//! Endpoint signatures.
//!
//! Each endpoint signs `formula.message_to_sign(index)` under the Ethereum personal-message
//! prefix. A signature binds to a position, so validation must also check that the recovered
//! signer is the address currently stored at that position.

use alloy_primitives::{eip191_hash_message, keccak256, Address, FixedBytes, B256};
use formula_types::{EndpointIndex, PresignState, RawSignature, EMPTY_SIGNATURE};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::Serialize;

use crate::{codec::hex_to_bytes, errors::SigningError, formula::Formula};

/// Parse a hex private key, with or without `0x`.
pub fn signing_key_from_hex(input: &str) -> Result<SigningKey, SigningError> {
    let raw = hex_to_bytes(input.trim()).map_err(|_| SigningError::InvalidKey)?;
    SigningKey::from_slice(&raw).map_err(|_| SigningError::InvalidKey)
}

/// Ethereum address controlled by `key`.
pub fn address_of(key: &SigningKey) -> Address {
    address_of_verifying_key(key.verifying_key())
}

fn address_of_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Digest actually passed to ECDSA for endpoint `index`.
pub fn signing_digest(formula: &Formula, index: EndpointIndex) -> B256 {
    eip191_hash_message(formula.message_to_sign(index))
}

/// Sign position `index` of `formula`; returns `r‖s‖v` with `v ∈ {27, 28}`.
pub fn sign_endpoint(
    formula: &Formula,
    key: &SigningKey,
    index: EndpointIndex,
) -> Result<RawSignature, SigningError> {
    if usize::from(index) >= formula.endpoints().len() {
        return Err(SigningError::EndpointOutOfRange(index));
    }
    if index >= formula.signed_endpoint_count() {
        return Err(SigningError::NotASignedEndpoint(index));
    }

    let digest = signing_digest(formula, index);
    let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_slice())?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = 27 + recovery_id.to_byte();
    Ok(FixedBytes(out))
}

/// Recover the address that produced `signature` over `digest`.
/// Accepts `v` in {0,1,27,28}.
pub fn recover_signer(digest: B256, signature: &RawSignature) -> Result<Address, SigningError> {
    let v = match signature[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        other => return Err(SigningError::Ecdsa(format!("unsupported recovery byte {other}"))),
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| SigningError::Ecdsa(format!("unsupported recovery byte {v}")))?;
    let signature = Signature::from_slice(&signature[..64])?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)?;
    Ok(address_of_verifying_key(&key))
}

/// Signer of the signature stored at position `index`.
pub fn recover_endpoint_signer(formula: &Formula, index: EndpointIndex) -> Result<Address, SigningError> {
    if usize::from(index) >= formula.endpoints().len() {
        return Err(SigningError::EndpointOutOfRange(index));
    }
    let signature = formula.signature(index);
    if signature == EMPTY_SIGNATURE {
        return Err(SigningError::MissingSignature(index));
    }
    recover_signer(signing_digest(formula, index), &signature)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSignatureStatus {
    pub index: EndpointIndex,
    pub address: Address,
    pub requires_signature: bool,
    pub recovered: Option<Address>,
    pub presign: PresignState,
    pub valid: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureValidation {
    pub endpoints: Vec<EndpointSignatureStatus>,
    pub is_valid: bool,
}

/// Mirror of the settlement contract's authorization check: every signed endpoint needs
/// either a signature recovering to its own address or a `Permitted` presign.
/// `presigns` is indexed by endpoint; missing entries count as `Default`.
pub fn validate_signatures(formula: &Formula, presigns: &[PresignState]) -> SignatureValidation {
    let endpoints: Vec<EndpointSignatureStatus> = formula
        .endpoints()
        .iter()
        .enumerate()
        .map(|(i, address)| {
            let index = i as EndpointIndex;
            let requires_signature = index < formula.signed_endpoint_count();
            let presign = presigns.get(i).copied().unwrap_or_default();
            let recovered = recover_endpoint_signer(formula, index).ok();
            let valid = !requires_signature
                || presign == PresignState::Permitted
                || recovered == Some(*address);
            EndpointSignatureStatus { index, address: *address, requires_signature, recovered, presign, valid }
        })
        .collect();

    let is_valid = endpoints.iter().all(|e| e.valid);
    SignatureValidation { endpoints, is_valid }
}
