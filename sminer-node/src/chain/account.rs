//! Account and runtime resolution
//!
//! Everything a signature binds to is read fresh from the node right before
//! each submission: the runtime schema, the runtime versions, the genesis
//! hash and the account's nonce. Nothing is cached between submissions.
//! The miner's on-chain record is read the same way.

use sminer_core::{
    decode_account_nonce, decode_miner_info, miner_items_key, system_account_key, AccountId,
    AccountState, ChainError, ChainSchema, MinerInfo, Result,
};
use tracing::debug;

use super::rpc::ChainRpc;

/// Schema and account state for one submission
#[derive(Debug, Clone)]
pub struct ResolvedState {
    pub schema: ChainSchema,
    pub state: AccountState,
}

/// Fetch the schema and the signing state of `account`
pub async fn resolve_account<C: ChainRpc + ?Sized>(rpc: &C, account: &AccountId) -> Result<ResolvedState> {
    let raw = rpc.metadata().await.map_err(ChainError::into_schema_fetch)?;
    let schema = ChainSchema::decode(&raw).map_err(ChainError::into_schema_fetch)?;

    let genesis_hash = rpc.genesis_hash().await.map_err(ChainError::into_schema_fetch)?;
    let version = rpc
        .runtime_version()
        .await
        .map_err(ChainError::into_schema_fetch)?;

    let stored = rpc
        .storage(&system_account_key(account), None)
        .await
        .map_err(ChainError::into_storage_fetch)?
        .ok_or_else(|| ChainError::AccountNotFound(account.to_string()))?;
    let nonce = decode_account_nonce(&schema, &stored).map_err(ChainError::into_storage_fetch)?;

    debug!(
        account = %account,
        nonce,
        spec_version = version.spec_version,
        transaction_version = version.transaction_version,
        "Resolved account state"
    );

    Ok(ResolvedState {
        schema,
        state: AccountState {
            nonce,
            spec_version: version.spec_version,
            transaction_version: version.transaction_version,
            genesis_hash,
        },
    })
}

/// Read `Sminer.MinerItems` for `account`; `None` when no record exists
pub async fn read_miner_info<C: ChainRpc + ?Sized>(rpc: &C, account: &AccountId) -> Result<Option<MinerInfo>> {
    let raw = rpc.metadata().await.map_err(ChainError::into_schema_fetch)?;
    let schema = ChainSchema::decode(&raw).map_err(ChainError::into_schema_fetch)?;
    let key = miner_items_key(&schema, account).map_err(ChainError::into_schema_fetch)?;

    let Some(stored) = rpc
        .storage(&key, None)
        .await
        .map_err(ChainError::into_storage_fetch)?
    else {
        debug!(account = %account, "No miner record");
        return Ok(None);
    };
    let info = decode_miner_info(&schema, &stored).map_err(ChainError::into_storage_fetch)?;
    debug!(account = %account, peer_id = info.peer_id, "Read miner record");
    Ok(Some(info))
}
