//! Flow transactions and their canonical RLP encoding.

use alloy_rlp::{Decodable, Encodable, Header};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{Address, Identifier, Signature};

/// Domain tag prepended to transaction messages before signing,
/// right-padded with zeros to 32 bytes.
pub const TRANSACTION_DOMAIN_TAG: [u8; 32] = domain_tag(b"FLOW-V0.0-transaction");

const fn domain_tag(tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < tag.len() {
        out[i] = tag[i];
        i += 1;
    }
    out
}

/// Key whose sequence number authorizes the transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalKey {
    pub address: Address,
    pub key_index: u32,
    pub sequence_number: u64,
}

/// A signature attached to a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub address: Address,
    /// Position of `address` in the transaction's signer list.
    pub signer_index: u32,
    pub key_index: u32,
    pub signature: Signature,
}

/// A Flow transaction.
///
/// Proposer, payer and authorizers may overlap; every distinct address signs
/// once. Non-payer signers sign the payload, the payer signs the envelope
/// (payload plus payload signatures) last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub script: Vec<u8>,
    /// JSON-Cadence encoded arguments.
    pub arguments: Vec<Vec<u8>>,
    pub reference_block_id: Identifier,
    pub gas_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: Address,
    pub authorizers: Vec<Address>,
    pub payload_signatures: Vec<TransactionSignature>,
    pub envelope_signatures: Vec<TransactionSignature>,
}

impl Transaction {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction ID, the SHA3-256 hash of the canonical encoding.
    pub fn id(&self) -> Identifier {
        Identifier::hash(&self.encode())
    }

    /// Distinct signing addresses: proposer, payer, then authorizers.
    pub fn signer_list(&self) -> Vec<Address> {
        let mut signers = Vec::new();
        let mut push = |address: Address| {
            if !signers.contains(&address) {
                signers.push(address);
            }
        };
        push(self.proposal_key.address);
        push(self.payer);
        for authorizer in &self.authorizers {
            push(*authorizer);
        }
        signers
    }

    fn signer_index(&self, address: Address) -> Result<u32, Error> {
        self.signer_list()
            .iter()
            .position(|a| *a == address)
            .map(|i| i as u32)
            .ok_or_else(|| {
                Error::InvalidTransaction(format!(
                    "{} is not a proposer, payer or authorizer of this transaction",
                    address
                ))
            })
    }

    /// Message a payload signer signs: domain tag plus payload encoding.
    pub fn payload_message(&self) -> Vec<u8> {
        let mut message = TRANSACTION_DOMAIN_TAG.to_vec();
        message.extend_from_slice(&self.payload_rlp());
        message
    }

    /// Message the payer signs: domain tag plus envelope encoding.
    pub fn envelope_message(&self) -> Vec<u8> {
        let mut message = TRANSACTION_DOMAIN_TAG.to_vec();
        message.extend_from_slice(&self.envelope_rlp());
        message
    }

    /// Whether `address` has signed the payload or the envelope.
    pub fn is_signed_by(&self, address: Address) -> bool {
        self.payload_signatures
            .iter()
            .chain(&self.envelope_signatures)
            .any(|s| s.address == address)
    }

    fn check_new_signature(&self, address: Address, key_index: u32) -> Result<u32, Error> {
        let signer_index = self.signer_index(address)?;
        let duplicate = self
            .payload_signatures
            .iter()
            .chain(&self.envelope_signatures)
            .any(|s| s.address == address && s.key_index == key_index);
        if duplicate {
            return Err(Error::InvalidTransaction(format!(
                "key {} of {} has already signed this transaction",
                key_index, address
            )));
        }
        Ok(signer_index)
    }

    /// Attach a payload signature, keeping signatures ordered by signer
    /// and key index.
    ///
    /// Fails once the envelope is signed, since the envelope commits to the
    /// payload signatures.
    pub fn add_payload_signature(
        &mut self,
        address: Address,
        key_index: u32,
        signature: Signature,
    ) -> Result<(), Error> {
        if !self.envelope_signatures.is_empty() {
            return Err(Error::InvalidTransaction(
                "payload cannot be signed after the envelope".to_string(),
            ));
        }
        let signer_index = self.check_new_signature(address, key_index)?;
        self.payload_signatures.push(TransactionSignature {
            address,
            signer_index,
            key_index,
            signature,
        });
        self.payload_signatures
            .sort_by_key(|s| (s.signer_index, s.key_index));
        Ok(())
    }

    /// Attach an envelope signature.
    pub fn add_envelope_signature(
        &mut self,
        address: Address,
        key_index: u32,
        signature: Signature,
    ) -> Result<(), Error> {
        let signer_index = self.check_new_signature(address, key_index)?;
        self.envelope_signatures.push(TransactionSignature {
            address,
            signer_index,
            key_index,
            signature,
        });
        self.envelope_signatures
            .sort_by_key(|s| (s.signer_index, s.key_index));
        Ok(())
    }

    // ========================================================================
    // RLP
    // ========================================================================

    fn payload_rlp(&self) -> Vec<u8> {
        let arguments: Vec<Vec<u8>> = self.arguments.iter().map(|a| rlp_bytes(a)).collect();
        let authorizers: Vec<Vec<u8>> = self
            .authorizers
            .iter()
            .map(|a| rlp_bytes(a.as_bytes()))
            .collect();

        rlp_list(&[
            rlp_bytes(&self.script),
            rlp_list(&arguments),
            rlp_bytes(self.reference_block_id.as_bytes()),
            rlp_u64(self.gas_limit),
            rlp_bytes(self.proposal_key.address.as_bytes()),
            rlp_u64(self.proposal_key.key_index as u64),
            rlp_u64(self.proposal_key.sequence_number),
            rlp_bytes(self.payer.as_bytes()),
            rlp_list(&authorizers),
        ])
    }

    fn envelope_rlp(&self) -> Vec<u8> {
        rlp_list(&[
            self.payload_rlp(),
            rlp_signatures(&self.payload_signatures),
        ])
    }

    /// Canonical encoding of the full transaction, signatures included.
    pub fn encode(&self) -> Vec<u8> {
        rlp_list(&[
            self.payload_rlp(),
            rlp_signatures(&self.payload_signatures),
            rlp_signatures(&self.envelope_signatures),
        ])
    }

    /// Decode the canonical encoding produced by [`Transaction::encode`].
    pub fn decode(mut buf: &[u8]) -> Result<Self, Error> {
        let mut tx_fields = list_payload(&mut buf)?;
        if !buf.is_empty() {
            return Err(Error::Rlp("trailing bytes after transaction".to_string()));
        }

        let mut payload = list_payload(&mut tx_fields)?;
        let script = Header::decode_bytes(&mut payload, false)?.to_vec();

        let mut args = list_payload(&mut payload)?;
        let mut arguments = Vec::new();
        while !args.is_empty() {
            arguments.push(Header::decode_bytes(&mut args, false)?.to_vec());
        }

        let reference_block_id = Identifier::try_from(Header::decode_bytes(&mut payload, false)?)?;
        let gas_limit = u64::decode(&mut payload)?;
        let proposer = Address::try_from(Header::decode_bytes(&mut payload, false)?)?;
        let key_index = u32::decode(&mut payload)?;
        let sequence_number = u64::decode(&mut payload)?;
        let payer = Address::try_from(Header::decode_bytes(&mut payload, false)?)?;

        let mut auths = list_payload(&mut payload)?;
        let mut authorizers = Vec::new();
        while !auths.is_empty() {
            authorizers.push(Address::try_from(Header::decode_bytes(&mut auths, false)?)?);
        }

        let mut tx = Transaction {
            script,
            arguments,
            reference_block_id,
            gas_limit,
            proposal_key: ProposalKey {
                address: proposer,
                key_index,
                sequence_number,
            },
            payer,
            authorizers,
            payload_signatures: Vec::new(),
            envelope_signatures: Vec::new(),
        };

        let signers = tx.signer_list();
        tx.payload_signatures = decode_signatures(&mut tx_fields, &signers)?;
        tx.envelope_signatures = decode_signatures(&mut tx_fields, &signers)?;
        Ok(tx)
    }

    /// Hex form of [`Transaction::encode`], used to hand payloads between
    /// signers.
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Decode the hex form produced by [`Transaction::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| Error::InvalidTransaction(format!("payload is not valid hex: {}", e)))?;
        Self::decode(&bytes)
    }
}

fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    bytes.encode(&mut out);
    out
}

fn rlp_u64(value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode(&mut out);
    out
}

/// Wrap already-encoded items in a list header.
fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_length = items.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn rlp_signatures(signatures: &[TransactionSignature]) -> Vec<u8> {
    let items: Vec<Vec<u8>> = signatures
        .iter()
        .map(|s| {
            rlp_list(&[
                rlp_u64(s.signer_index as u64),
                rlp_u64(s.key_index as u64),
                rlp_bytes(s.signature.as_bytes()),
            ])
        })
        .collect();
    rlp_list(&items)
}

/// Consume a list header and return its payload, advancing `buf` past it.
fn list_payload<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], Error> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(Error::Rlp("expected list".to_string()));
    }
    if buf.len() < header.payload_length {
        return Err(Error::Rlp("list payload truncated".to_string()));
    }
    let (payload, rest) = buf.split_at(header.payload_length);
    *buf = rest;
    Ok(payload)
}

fn decode_signatures(
    buf: &mut &[u8],
    signers: &[Address],
) -> Result<Vec<TransactionSignature>, Error> {
    let mut list = list_payload(buf)?;
    let mut signatures = Vec::new();
    while !list.is_empty() {
        let mut fields = list_payload(&mut list)?;
        let signer_index = u32::decode(&mut fields)?;
        let key_index = u32::decode(&mut fields)?;
        let signature = Signature::from_bytes(Header::decode_bytes(&mut fields, false)?);
        let address = signers.get(signer_index as usize).copied().ok_or_else(|| {
            Error::InvalidTransaction(format!("signer index {} out of range", signer_index))
        })?;
        signatures.push(TransactionSignature {
            address,
            signer_index,
            key_index,
            signature,
        });
    }
    Ok(signatures)
}
