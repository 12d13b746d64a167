//! Step 2: create the asset's ERC-6551 token-bound account.
//!
//! The account address is known before the transaction is sent. After
//! inclusion it is checked against the registry's `account` view and, when
//! present, the `AccountCreated` event; any disagreement is a consistency
//! error rather than a silent pick.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent};
use snacks_core::chain::{TxReceipt, UnsignedTx};
use snacks_core::workflow::StepResult;
use tracing::warn;

use crate::STEP_GAS_LIMIT;
use crate::contracts::{ContractSet, IERC6551Registry};
use crate::error::StepError;
use crate::token_bound::token_bound_address;

/// Salt every account is created with.
pub const ACCOUNT_SALT: u64 = 1;

/// Builds `createAccount(implementation, chainId, asset, tokenId, 1, 0x)` on
/// the registry.
#[must_use]
pub fn build(contracts: &ContractSet, token_id: U256) -> UnsignedTx {
    let call = IERC6551Registry::createAccountCall {
        implementation: contracts.account_implementation,
        chainId: U256::from(contracts.chain_id),
        tokenContract: contracts.asset,
        tokenId: token_id,
        salt: U256::from(ACCOUNT_SALT),
        initData: Bytes::new(),
    };
    UnsignedTx {
        to: contracts.registry,
        input: Bytes::from(call.abi_encode()),
        value: U256::ZERO,
        gas_limit: STEP_GAS_LIMIT,
    }
}

/// The account address computed off-chain.
#[must_use]
pub fn computed_account(contracts: &ContractSet, token_id: U256) -> Address {
    token_bound_address(
        contracts.registry,
        contracts.account_implementation,
        contracts.chain_id,
        contracts.asset,
        token_id,
        U256::from(ACCOUNT_SALT),
    )
}

/// Target and calldata for the registry's `account` view.
#[must_use]
pub fn account_query(contracts: &ContractSet, token_id: U256) -> (Address, Bytes) {
    let call = IERC6551Registry::accountCall {
        implementation: contracts.account_implementation,
        chainId: U256::from(contracts.chain_id),
        tokenContract: contracts.asset,
        tokenId: token_id,
        salt: U256::from(ACCOUNT_SALT),
    };
    (contracts.registry, Bytes::from(call.abi_encode()))
}

/// Decodes the `account` view's return data.
///
/// # Errors
///
/// Returns `StepError::Decode` if `output` is not an ABI-encoded address.
pub fn decode_account_query(output: &[u8]) -> Result<Address, StepError> {
    IERC6551Registry::accountCall::abi_decode_returns(output)
        .map_err(|e| StepError::Decode(e.to_string()))
}

/// Account reported by an `AccountCreated` event from the registry.
#[must_use]
pub fn created_account(contracts: &ContractSet, receipt: &TxReceipt) -> Option<Address> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == contracts.registry)
        .find_map(|log| IERC6551Registry::AccountCreated::decode_log_data(&log.data).ok())
        .map(|event| event.account)
}

/// Checks that every available source agrees on the bound account.
///
/// # Errors
///
/// Returns `StepError::AccountMismatch` naming every source when they
/// disagree.
pub fn verify(
    computed: Address,
    queried: Address,
    emitted: Option<Address>,
) -> Result<StepResult, StepError> {
    let emitted_agrees = emitted.is_none_or(|account| account == computed);
    if computed != queried || !emitted_agrees {
        warn!(%computed, %queried, ?emitted, "bound account sources disagree");
        return Err(StepError::AccountMismatch(format!(
            "computed {computed}, registry reports {queried}, event reports {emitted:?}"
        )));
    }
    Ok(StepResult::AccountBound { account: computed })
}
