//! Immutable Formula value: endpoints, ordered operations and per-endpoint signatures,
//! plus the canonical hash every signer agrees to.

mod builder;
mod input;
mod wire;

pub use builder::FormulaBuilder;
pub use input::{FormulaData, InstructionRef, Literal, OperationData};

use alloy_primitives::{keccak256, Address, B256};
use formula_types::{
    EndpointIndex, InstructionCode, Operation, RawSignature, ValueType, EMPTY_SIGNATURE,
    FEE_INSTRUCTION,
};

use serde::{Serialize, Serializer};

use crate::{
    codec,
    errors::{FormulaError, InvalidFormulaReason},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formula {
    salt: B256,
    endpoints: Vec<Address>,
    signed_endpoint_count: u16,
    operations: Vec<Operation>,
    /// Trailing empty signatures are never stored.
    signatures: Vec<RawSignature>,
    message_hash: B256,
}

impl Formula {
    /// Validate and freeze. An empty endpoint list becomes a single zero-address placeholder,
    /// and a missing signed count defaults to the number of endpoints.
    pub fn new(
        salt: B256,
        endpoints: Vec<Address>,
        signed_endpoint_count: Option<u16>,
        operations: Vec<Operation>,
        mut signatures: Vec<RawSignature>,
    ) -> Result<Self, FormulaError> {
        let endpoints = if endpoints.is_empty() { vec![Address::ZERO] } else { endpoints };
        if endpoints.len() > usize::from(u16::MAX) {
            return Err(InvalidFormulaReason::TooManyEndpoints(endpoints.len()).into());
        }
        if operations.len() > usize::from(u16::MAX) {
            return Err(InvalidFormulaReason::TooManyOperations(operations.len()).into());
        }

        let signed_endpoint_count = signed_endpoint_count.unwrap_or(endpoints.len() as u16);
        if usize::from(signed_endpoint_count) > endpoints.len() {
            return Err(InvalidFormulaReason::SignedEndpointCountOverflow {
                signed: signed_endpoint_count.into(),
                endpoints: endpoints.len(),
            }
            .into());
        }

        for (position, operation) in operations.iter().enumerate() {
            if let Some(index) = operation
                .endpoints()
                .into_iter()
                .find(|index| usize::from(*index) >= endpoints.len())
            {
                return Err(InvalidFormulaReason::EndpointOutOfRange {
                    operation: position,
                    index,
                    endpoints: endpoints.len(),
                }
                .into());
            }
        }

        while signatures.last() == Some(&EMPTY_SIGNATURE) {
            signatures.pop();
        }
        if signatures.len() > usize::from(signed_endpoint_count) {
            return Err(InvalidFormulaReason::TooManySignatures {
                signatures: signatures.len(),
                signed: signed_endpoint_count.into(),
            }
            .into());
        }

        let mut formula = Formula {
            salt,
            endpoints,
            signed_endpoint_count,
            operations,
            signatures,
            message_hash: B256::ZERO,
        };
        formula.message_hash = keccak256(formula.hash_preimage()?);
        Ok(formula)
    }

    pub fn salt(&self) -> B256 {
        self.salt
    }

    pub fn endpoints(&self) -> &[Address] {
        &self.endpoints
    }

    pub fn endpoint(&self, index: EndpointIndex) -> Option<Address> {
        self.endpoints.get(usize::from(index)).copied()
    }

    pub fn signed_endpoint_count(&self) -> u16 {
        self.signed_endpoint_count
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn signatures(&self) -> &[RawSignature] {
        &self.signatures
    }

    /// Signature slot at `index`, the empty sentinel when absent.
    pub fn signature(&self, index: EndpointIndex) -> RawSignature {
        self.signatures.get(usize::from(index)).copied().unwrap_or(EMPTY_SIGNATURE)
    }

    /// Canonical hash over salt, counts and operations. Endpoint addresses and signatures
    /// are not part of it.
    pub fn message_hash(&self) -> B256 {
        self.message_hash
    }

    /// Digest endpoint `index` signs: `keccak256(messageHash ‖ uint16 index)`.
    pub fn message_to_sign(&self, index: EndpointIndex) -> B256 {
        let mut buf = Vec::with_capacity(34);
        buf.extend_from_slice(self.message_hash.as_slice());
        buf.extend_from_slice(&index.to_be_bytes());
        keccak256(buf)
    }

    pub fn is_signed(&self, index: EndpointIndex) -> bool {
        self.signature(index) != EMPTY_SIGNATURE
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Position of the first fee operation.
    pub fn fee_index(&self) -> Option<usize> {
        self.operations.iter().position(|op| op.code() == FEE_INSTRUCTION)
    }

    /// Same endpoints and operations under a fresh salt, without signatures.
    pub fn clone_new(&self) -> Result<Self, FormulaError> {
        Formula::new(
            B256::random(),
            self.endpoints.clone(),
            Some(self.signed_endpoint_count),
            self.operations.clone(),
            Vec::new(),
        )
    }

    /// Re-target the Formula to other addresses; operand indices and the hash are unchanged.
    pub fn with_endpoints(&self, endpoints: Vec<Address>) -> Result<Self, FormulaError> {
        Formula::new(
            self.salt,
            endpoints,
            Some(self.signed_endpoint_count),
            self.operations.clone(),
            self.signatures.clone(),
        )
    }

    pub fn with_signatures(&self, signatures: Vec<RawSignature>) -> Result<Self, FormulaError> {
        Formula::new(
            self.salt,
            self.endpoints.clone(),
            Some(self.signed_endpoint_count),
            self.operations.clone(),
            signatures,
        )
    }

    /// Copy with `signature` stored at `index`, padding earlier slots with the empty sentinel.
    pub fn with_signature(
        &self,
        index: EndpointIndex,
        signature: RawSignature,
    ) -> Result<Self, FormulaError> {
        let slot = usize::from(index);
        let mut signatures = self.signatures.clone();
        if signatures.len() <= slot {
            signatures.resize(slot + 1, EMPTY_SIGNATURE);
        }
        signatures[slot] = signature;
        self.with_signatures(signatures)
    }

    fn hash_preimage(&self) -> Result<Vec<u8>, FormulaError> {
        let mut buf = Vec::with_capacity(36 + self.operations.len() * 64);
        buf.extend_from_slice(self.salt.as_slice());
        buf.extend_from_slice(&(self.endpoints.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.signed_endpoint_count.to_be_bytes());
        for operation in &self.operations {
            encode_operation(&mut buf, operation)?;
        }
        Ok(buf)
    }
}

/// Serialized as its JSON description plus the derived message hash.
impl Serialize for Formula {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct View {
            #[serde(flatten)]
            data: FormulaData,
            message_hash: B256,
        }
        View { data: FormulaData::from(self), message_hash: self.message_hash }.serialize(serializer)
    }
}

/// `instructionCode(2B) ‖ operandsPacked`.
pub(crate) fn encode_operation(buf: &mut Vec<u8>, operation: &Operation) -> Result<(), FormulaError> {
    let code: InstructionCode = operation.code();
    buf.extend_from_slice(&(code as u16).to_be_bytes());
    let types: Vec<ValueType> = code.operand_types();
    buf.extend_from_slice(&codec::encode_packed(&types, &operation.operands())?);
    Ok(())
}
