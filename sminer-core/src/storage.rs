//! Storage keys and values read by the miner

use parity_scale_codec::Decode;
use xxhash_rust::xxh64::xxh64;

use crate::crypto::{blake2_128, blake2_256, AccountId};
use crate::error::{ChainError, Result};
use crate::events::names;
use crate::schema::{ChainSchema, StorageHasher};
use crate::value::Value;

/// Storage entry holding per-account miner records
pub const MINER_ITEMS: &str = "MinerItems";

/// xxHash64 concatenated over `N / 8` consecutive seeds
fn twox<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    for (seed, chunk) in out.chunks_exact_mut(8).enumerate() {
        chunk.copy_from_slice(&xxh64(data, seed as u64).to_le_bytes());
    }
    out
}

pub fn twox_64(data: &[u8]) -> [u8; 8] {
    twox(data)
}

pub fn twox_128(data: &[u8]) -> [u8; 16] {
    twox(data)
}

pub fn twox_256(data: &[u8]) -> [u8; 32] {
    twox(data)
}

impl StorageHasher {
    /// Hash an encoded map key
    pub fn hash(self, key: &[u8]) -> Vec<u8> {
        match self {
            StorageHasher::Blake2_128 => blake2_128(key).to_vec(),
            StorageHasher::Blake2_256 => blake2_256(key).to_vec(),
            StorageHasher::Blake2_128Concat => [&blake2_128(key)[..], key].concat(),
            StorageHasher::Twox128 => twox_128(key).to_vec(),
            StorageHasher::Twox256 => twox_256(key).to_vec(),
            StorageHasher::Twox64Concat => [&twox_64(key)[..], key].concat(),
            StorageHasher::Identity => key.to_vec(),
        }
    }
}

/// `twox128(pallet) ++ twox128(entry)`
pub fn storage_prefix(pallet: &str, entry: &str) -> Vec<u8> {
    [twox_128(pallet.as_bytes()), twox_128(entry.as_bytes())].concat()
}

/// Key of a single-key storage map entry
pub fn storage_map_key(pallet: &str, entry: &str, hasher: StorageHasher, key: &[u8]) -> Vec<u8> {
    let mut out = storage_prefix(pallet, entry);
    out.extend(hasher.hash(key));
    out
}

/// Key of `System.Account(account)`: blake2_128_concat over the account id
pub fn system_account_key(account: &AccountId) -> Vec<u8> {
    storage_map_key(
        names::SYSTEM,
        "Account",
        StorageHasher::Blake2_128Concat,
        account.as_bytes(),
    )
}

/// Key of `System.Events`
pub fn system_events_key() -> Vec<u8> {
    storage_prefix(names::SYSTEM, "Events")
}

/// Read the nonce out of a `System.Account` value
///
/// When the schema declares the value type, the value is decoded through
/// the registry and its `nonce` field is used. Otherwise the leading u32 is
/// taken, which is where every known `AccountInfo` layout keeps it.
pub fn decode_account_nonce(schema: &ChainSchema, raw: &[u8]) -> Result<u64> {
    if let Some(entry) = schema.storage_entry(names::SYSTEM, "Account") {
        let value = schema.registry().decode_value(entry.value, &mut &raw[..])?;
        return value
            .field("nonce")
            .and_then(|n| n.as_u64())
            .ok_or_else(|| ChainError::Codec("account info has no nonce field".into()));
    }

    Ok(u32::decode(&mut &raw[..])?.into())
}

/// The chain's record of a registered miner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerInfo {
    /// Zero until the chain assigns one
    pub peer_id: u64,
    pub beneficiary: Option<AccountId>,
    pub collaterals: Option<u128>,
    pub state: Option<String>,
}

impl MinerInfo {
    pub fn is_registered(&self) -> bool {
        self.peer_id > 0
    }
}

/// Key of `Sminer.MinerItems(account)`, hashed as the runtime declares
pub fn miner_items_key(schema: &ChainSchema, account: &AccountId) -> Result<Vec<u8>> {
    let entry = schema
        .storage_entry(names::SMINER, MINER_ITEMS)
        .ok_or_else(|| ChainError::Codec("runtime has no Sminer.MinerItems".into()))?;
    let hasher = match entry.hashers.as_slice() {
        [hasher] => *hasher,
        other => {
            return Err(ChainError::Codec(format!(
                "Sminer.MinerItems expects one hasher, found {}",
                other.len()
            )))
        }
    };
    Ok(storage_map_key(
        names::SMINER,
        MINER_ITEMS,
        hasher,
        account.as_bytes(),
    ))
}

/// Decode a `Sminer.MinerItems` value through the registry
pub fn decode_miner_info(schema: &ChainSchema, raw: &[u8]) -> Result<MinerInfo> {
    let entry = schema
        .storage_entry(names::SMINER, MINER_ITEMS)
        .ok_or_else(|| ChainError::Codec("runtime has no Sminer.MinerItems".into()))?;
    let value = schema.registry().decode_value(entry.value, &mut &raw[..])?;

    let peer_id = value
        .field("peerid")
        .or_else(|| value.field("peer_id"))
        .and_then(Value::as_u64)
        .ok_or_else(|| ChainError::Codec("miner info has no peer id".into()))?;

    Ok(MinerInfo {
        peer_id,
        beneficiary: value.field("beneficiary").and_then(Value::as_account),
        collaterals: value.field("collaterals").and_then(Value::as_u128),
        state: value
            .field("state")
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::schema::TypeRegistry;

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const ALICE_ACCOUNT_KEY: &str = "26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9de1e86a9a8c739864cf3cc5ec2bea59fd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    #[test]
    fn test_known_keys() {
        let alice: AccountId = ALICE.parse().unwrap();
        assert_eq!(hex::encode(system_account_key(&alice)), ALICE_ACCOUNT_KEY);
        assert_eq!(
            hex::encode(system_events_key()),
            "26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7"
        );
        assert_eq!(hex::encode(twox_128(b"System")), "26aa394eea5630e07c48ae0c9558cef7");
    }

    #[test]
    fn test_hasher_widths() {
        let key = [7u8; 32];
        assert_eq!(StorageHasher::Blake2_128.hash(&key).len(), 16);
        assert_eq!(StorageHasher::Blake2_256.hash(&key).len(), 32);
        assert_eq!(StorageHasher::Twox128.hash(&key).len(), 16);
        assert_eq!(StorageHasher::Twox256.hash(&key).len(), 32);
        assert_eq!(StorageHasher::Identity.hash(&key), key.to_vec());

        let concat = StorageHasher::Twox64Concat.hash(&key);
        assert_eq!(&concat[..8], &twox_64(&key));
        assert_eq!(&concat[8..], &key);
    }

    #[test]
    fn test_nonce_through_registry() {
        let schema = fixtures::miner_schema();
        let raw = fixtures::encode_account_info(42, 1_000);
        assert_eq!(decode_account_nonce(&schema, &raw).unwrap(), 42);
        assert!(decode_account_nonce(&schema, &raw[..10]).is_err());
    }

    #[test]
    fn test_nonce_without_storage_metadata() {
        let schema = ChainSchema::new(TypeRegistry::new(), Vec::new());
        let raw = fixtures::encode_account_info(9, 0);
        assert_eq!(decode_account_nonce(&schema, &raw).unwrap(), 9);
        assert!(decode_account_nonce(&schema, &[1, 2]).is_err());
    }

    #[test]
    fn test_miner_items_key_and_value() {
        let schema = fixtures::miner_schema();
        let alice: AccountId = ALICE.parse().unwrap();

        let key = miner_items_key(&schema, &alice).unwrap();
        assert_eq!(&key[..32], &storage_prefix("Sminer", "MinerItems")[..]);
        assert_eq!(&key[32..48], &blake2_128(alice.as_bytes()));
        assert_eq!(&key[48..], alice.as_bytes());

        let beneficiary = AccountId([4u8; 32]);
        let raw = fixtures::encode_miner_info(12, beneficiary, 2_000);
        let info = decode_miner_info(&schema, &raw).unwrap();
        assert_eq!(info.peer_id, 12);
        assert!(info.is_registered());
        assert_eq!(info.beneficiary, Some(beneficiary));
        assert_eq!(info.collaterals, Some(2_000));
        assert_eq!(info.state.as_deref(), Some("positive"));

        assert!(decode_miner_info(&schema, &raw[..4]).is_err());
    }

    #[test]
    fn test_miner_items_requires_the_entry() {
        let schema = ChainSchema::new(TypeRegistry::new(), Vec::new());
        let alice: AccountId = ALICE.parse().unwrap();
        assert!(matches!(
            miner_items_key(&schema, &alice),
            Err(ChainError::Codec(_))
        ));
    }
}
