//! Storage Miner Chain Core Library
//!
//! I/O-free building blocks for the storage miner's chain client.
//! This crate provides:
//! - SCALE helpers over `parity-scale-codec`
//! - Runtime metadata (V14/V15) decoding into a type registry and pallet table
//! - Registry-driven value and event decoding
//! - Storage keys for account, miner-record and event-log reads
//! - Signing identities (sr25519, ed25519) and SS58 rendering
//! - Call encoding and signed extrinsic construction
//! - Common error handling

pub mod codec;
pub mod crypto;
pub mod error;
pub mod events;
pub mod extrinsic;
mod metadata;
pub mod schema;
pub mod storage;
pub mod value;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use crypto::{AccountId, BlockHash, KeyScheme, MultiSignature, SigningIdentity};
pub use error::{ChainError, Result};
pub use events::{decode_event_records, ChainEvent, EventRecord, Phase, ProofPhase};
pub use extrinsic::{
    AccountState, CallArg, EncodedCall, ExtrinsicHeader, MultiAddress, SignedEnvelope,
    UnsignedCall,
};
pub use schema::{ArgKind, ChainSchema, PalletInfo, TypeRegistry};
pub use storage::{
    decode_account_nonce, decode_miner_info, miner_items_key, system_account_key,
    system_events_key, MinerInfo,
};
pub use value::Value;

/// Decimal places of the chain's native token
pub const TOKEN_DECIMALS: u32 = 12;

/// Default SS58 address prefix (generic substrate)
pub const DEFAULT_SS58_PREFIX: u16 = 42;
