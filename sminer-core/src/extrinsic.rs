//! Transaction building and signing
//!
//! An [`UnsignedCall`] names an operation (`Pallet.call`) and carries its
//! ordered arguments. Encoding it against the live [`ChainSchema`] resolves
//! the call indices and checks every argument against the declared field
//! type. [`SignedEnvelope::sign`] then binds the encoded call to the
//! account state (nonce, runtime versions, genesis hash) and produces the
//! version 4 signed extrinsic.

use parity_scale_codec::{Compact, Decode, Encode, Output};

use crate::codec::decode_exact;
use crate::crypto::{blake2_256, AccountId, BlockHash, MultiSignature, SigningIdentity};
use crate::error::{ChainError, Result};
use crate::schema::{ArgKind, ChainSchema};

/// Extrinsic format version
pub const EXTRINSIC_VERSION: u8 = 4;
/// Set on the version byte of signed extrinsics
pub const SIGNED_FLAG: u8 = 0b1000_0000;
/// Encoded immortal era
pub const IMMORTAL_ERA: u8 = 0x00;
/// Payloads longer than this are hashed before signing
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// Address of an extrinsic signer or call target
///
/// Only the account-id form is ever produced or accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum MultiAddress {
    #[codec(index = 0)]
    Id(AccountId),
}

/// Signed extension fields carried in the extrinsic body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
struct SignedExtra {
    era: u8,
    #[codec(compact)]
    nonce: u64,
    #[codec(compact)]
    tip: u128,
}

/// Signed extension data covered by the signature but not transmitted
#[derive(Encode)]
struct AdditionalSigned {
    spec_version: u32,
    transaction_version: u32,
    genesis_hash: BlockHash,
    checkpoint: BlockHash,
}

/// A single typed call argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Compact(u128),
    Bytes(Vec<u8>),
    BytesSeq(Vec<Vec<u8>>),
    AccountId(AccountId),
    MultiAddress(AccountId),
}

impl CallArg {
    pub fn kind(&self) -> ArgKind {
        match self {
            CallArg::U8(_) => ArgKind::U8,
            CallArg::U16(_) => ArgKind::U16,
            CallArg::U32(_) => ArgKind::U32,
            CallArg::U64(_) => ArgKind::U64,
            CallArg::U128(_) => ArgKind::U128,
            CallArg::Compact(_) => ArgKind::Compact,
            CallArg::Bytes(_) => ArgKind::Bytes,
            CallArg::BytesSeq(_) => ArgKind::BytesSeq,
            CallArg::AccountId(_) => ArgKind::AccountId,
            CallArg::MultiAddress(_) => ArgKind::MultiAddress,
        }
    }
}

impl Encode for CallArg {
    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        match self {
            CallArg::U8(v) => v.encode_to(dest),
            CallArg::U16(v) => v.encode_to(dest),
            CallArg::U32(v) => v.encode_to(dest),
            CallArg::U64(v) => v.encode_to(dest),
            CallArg::U128(v) => v.encode_to(dest),
            CallArg::Compact(v) => Compact(*v).encode_to(dest),
            CallArg::Bytes(b) => b.encode_to(dest),
            CallArg::BytesSeq(items) => items.encode_to(dest),
            CallArg::AccountId(account) => account.encode_to(dest),
            CallArg::MultiAddress(account) => MultiAddress::Id(*account).encode_to(dest),
        }
    }
}

/// An operation and its ordered arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedCall {
    operation: String,
    args: Vec<CallArg>,
}

impl UnsignedCall {
    pub fn new(operation: impl Into<String>, args: Vec<CallArg>) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &[CallArg] {
        &self.args
    }

    /// Encode against the chain schema
    ///
    /// Fails with `UnknownCall` when the operation does not exist and with
    /// `CallEncoding` when the argument count or any argument kind does not
    /// match the call's declared fields.
    pub fn encode(&self, schema: &ChainSchema) -> Result<EncodedCall> {
        let info = schema.call(&self.operation)?;
        let mismatch = |reason: String| ChainError::CallEncoding {
            call: self.operation.clone(),
            reason,
        };

        if info.fields.len() != self.args.len() {
            return Err(mismatch(format!(
                "expected {} arguments, got {}",
                info.fields.len(),
                self.args.len()
            )));
        }

        let mut bytes = (info.pallet_index, info.call_index).encode();
        for (position, (arg, field)) in self.args.iter().zip(info.fields).enumerate() {
            if !schema.registry().accepts(field.ty, arg.kind())? {
                return Err(mismatch(format!(
                    "argument {} ({}) does not accept {:?}",
                    position,
                    field.name.as_deref().unwrap_or("_"),
                    arg.kind()
                )));
            }
            arg.encode_to(&mut bytes);
        }

        Ok(EncodedCall {
            operation: self.operation.clone(),
            bytes,
        })
    }
}

/// Call bytes: `[pallet_index, call_index] ++ args`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    pub operation: String,
    pub bytes: Vec<u8>,
}

/// Per-submission view of the signing account and the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: u64,
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: BlockHash,
}

/// A signed extrinsic, ready to submit
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    call: EncodedCall,
    signer: AccountId,
    signature: MultiSignature,
    nonce: u64,
    state: AccountState,
}

impl SignedEnvelope {
    /// Sign `call` for `state` with zero tip and an immortal era
    pub fn sign(call: EncodedCall, identity: &SigningIdentity, state: &AccountState) -> Self {
        let payload = Self::signing_payload(&call.bytes, state);
        let signature = identity.sign(&payload);
        Self {
            signer: identity.account(),
            signature,
            nonce: state.nonce,
            state: *state,
            call,
        }
    }

    /// Bytes covered by the signature
    ///
    /// `call ++ era ++ compact(nonce) ++ compact(tip) ++ spec_version ++
    /// transaction_version ++ genesis ++ genesis`. The era is immortal, so
    /// the checkpoint block is the genesis block itself.
    pub fn signing_payload(call: &[u8], state: &AccountState) -> Vec<u8> {
        let mut payload = Vec::with_capacity(call.len() + 80);
        payload.extend_from_slice(call);
        SignedExtra {
            era: IMMORTAL_ERA,
            nonce: state.nonce,
            tip: 0,
        }
        .encode_to(&mut payload);
        AdditionalSigned {
            spec_version: state.spec_version,
            transaction_version: state.transaction_version,
            genesis_hash: state.genesis_hash,
            checkpoint: state.genesis_hash,
        }
        .encode_to(&mut payload);

        if payload.len() > MAX_UNHASHED_PAYLOAD {
            blake2_256(&payload).to_vec()
        } else {
            payload
        }
    }

    pub fn operation(&self) -> &str {
        &self.call.operation
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn signer(&self) -> AccountId {
        self.signer
    }

    pub fn signature(&self) -> &MultiSignature {
        &self.signature
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Length-prefixed extrinsic bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut body = (
            SIGNED_FLAG | EXTRINSIC_VERSION,
            MultiAddress::Id(self.signer),
            &self.signature,
            SignedExtra {
                era: IMMORTAL_ERA,
                nonce: self.nonce,
                tip: 0,
            },
        )
            .encode();
        body.extend_from_slice(&self.call.bytes);
        body.encode()
    }
}

/// Signer-side fields read back from an encoded signed extrinsic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtrinsicHeader {
    pub signer: AccountId,
    pub signature: MultiSignature,
    pub nonce: u64,
    pub tip: u128,
    pub call: Vec<u8>,
}

impl ExtrinsicHeader {
    /// Parse a length-prefixed v4 signed extrinsic with an immortal era
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let body: Vec<u8> = decode_exact(bytes)?;
        let mut input = &body[..];

        let version = u8::decode(&mut input)?;
        if version != SIGNED_FLAG | EXTRINSIC_VERSION {
            return Err(ChainError::Codec(format!(
                "not a signed v4 extrinsic: 0x{:02x}",
                version
            )));
        }
        let MultiAddress::Id(signer) = MultiAddress::decode(&mut input)?;
        let signature = MultiSignature::decode(&mut input)?;
        let extra = SignedExtra::decode(&mut input)?;
        if extra.era != IMMORTAL_ERA {
            return Err(ChainError::Codec("mortal era".into()));
        }

        Ok(Self {
            signer,
            signature,
            nonce: extra.nonce,
            tip: extra.tip,
            call: input.to_vec(),
        })
    }
}
