//! Step 1: mint the user's asset NFT.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent};
use snacks_core::chain::{TxReceipt, UnsignedTx};
use snacks_core::wallet::WalletAddress;
use snacks_core::workflow::StepResult;

use crate::STEP_GAS_LIMIT;
use crate::contracts::{ContractSet, ITummyNft};
use crate::error::StepError;

/// Builds `mintNFT(recipient, pointer)` on the asset contract.
#[must_use]
pub fn build(contracts: &ContractSet, recipient: &WalletAddress, pointer: &str) -> UnsignedTx {
    let call = ITummyNft::mintNFTCall {
        recipient: recipient.address(),
        tokenURI: pointer.to_owned(),
    };
    UnsignedTx {
        to: contracts.asset,
        input: Bytes::from(call.abi_encode()),
        value: U256::ZERO,
        gas_limit: STEP_GAS_LIMIT,
    }
}

/// Recovers the pointer a mint transaction was built with, so a resumed
/// mint reports the pointer that actually went on chain.
#[must_use]
pub fn pointer_of(tx: &UnsignedTx) -> Option<String> {
    ITummyNft::mintNFTCall::abi_decode(&tx.input)
        .ok()
        .map(|call| call.tokenURI)
}

/// Token id of the NFT minted by `emitter` to `recipient` in `receipt`,
/// read from its `Transfer(0x0, recipient, tokenId)` event.
#[must_use]
pub fn minted_token_id(receipt: &TxReceipt, emitter: Address, recipient: Address) -> Option<U256> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == emitter)
        .find_map(|log| {
            let transfer = ITummyNft::Transfer::decode_log_data(&log.data).ok()?;
            (transfer.from == Address::ZERO && transfer.to == recipient).then_some(transfer.tokenId)
        })
}

/// Extracts the step result from the mint's receipt.
///
/// # Errors
///
/// Returns `StepError::MissingEvent` if the receipt has no mint `Transfer`
/// from the asset contract to `recipient`.
pub fn extract(
    contracts: &ContractSet,
    recipient: &WalletAddress,
    pointer: String,
    receipt: &TxReceipt,
) -> Result<StepResult, StepError> {
    let token_id = minted_token_id(receipt, contracts.asset, recipient.address())
        .ok_or(StepError::MissingEvent("asset Transfer"))?;
    Ok(StepResult::AssetMinted { token_id, pointer })
}
