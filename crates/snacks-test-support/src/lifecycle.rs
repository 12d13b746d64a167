//! A `FakeChain` scripted to behave like the deployed lifecycle contracts.

use alloy_primitives::{Address, Bytes, Log, U256, address};
use alloy_sol_types::{SolCall, SolEvent};
use snacks_core::chain::ChainError;
use snacks_steps::ContractSet;
use snacks_steps::contracts::{IERC6551Registry, ITummyNft};
use snacks_steps::token_bound_address;

use crate::chain::{FakeChain, SentTx};

/// Contract addresses used across engine and API tests.
#[must_use]
pub fn test_contracts() -> ContractSet {
    ContractSet {
        asset: address!("0x00000000000000000000000000000000000000a5"),
        registry: address!("0x00000000000000000000000000000000000000e6"),
        account_implementation: address!("0x00000000000000000000000000000000000000ac"),
        attestation: address!("0x00000000000000000000000000000000000000b7"),
        chain_id: 5,
    }
}

/// Token id the scripted asset contract assigns to a mint sent with `nonce`.
#[must_use]
pub fn asset_token_id(nonce: u64) -> U256 {
    U256::from(100 + nonce)
}

/// A chain where mints emit `Transfer` from the zero address, account
/// creation emits `AccountCreated` with the CREATE2 address, and the
/// registry's `account` view answers with the same address.
#[must_use]
pub fn lifecycle_chain(contracts: ContractSet) -> FakeChain {
    lifecycle_chain_with_registry_answer(contracts, None)
}

/// Like [`lifecycle_chain`], but the registry's `account` view always
/// answers `answer`.
#[must_use]
pub fn lifecycle_chain_with_registry_answer(
    contracts: ContractSet,
    answer: Option<Address>,
) -> FakeChain {
    FakeChain::new()
        .with_logs(move |tx| lifecycle_logs(&contracts, tx))
        .with_calls(move |to, input| {
            if to != contracts.registry {
                return Err(ChainError::CallReverted(format!("no code at {to}")));
            }
            let call = IERC6551Registry::accountCall::abi_decode(input)
                .map_err(|e| ChainError::CallReverted(e.to_string()))?;
            let account = answer.unwrap_or_else(|| {
                token_bound_address(
                    to,
                    call.implementation,
                    call.chainId.to::<u64>(),
                    call.tokenContract,
                    call.tokenId,
                    call.salt,
                )
            });
            Ok(Bytes::copy_from_slice(account.into_word().as_slice()))
        })
}

fn lifecycle_logs(contracts: &ContractSet, tx: &SentTx) -> Vec<Log> {
    if tx.to == contracts.asset || tx.to == contracts.attestation {
        let Ok(call) = ITummyNft::mintNFTCall::abi_decode(&tx.input) else {
            return Vec::new();
        };
        let token_id = if tx.to == contracts.asset {
            asset_token_id(tx.nonce)
        } else {
            U256::from(500 + tx.nonce)
        };
        let transfer = ITummyNft::Transfer {
            from: Address::ZERO,
            to: call.recipient,
            tokenId: token_id,
        };
        return vec![Log {
            address: tx.to,
            data: transfer.encode_log_data(),
        }];
    }
    if tx.to == contracts.registry {
        let Ok(call) = IERC6551Registry::createAccountCall::abi_decode(&tx.input) else {
            return Vec::new();
        };
        let account = token_bound_address(
            contracts.registry,
            call.implementation,
            call.chainId.to::<u64>(),
            call.tokenContract,
            call.tokenId,
            call.salt,
        );
        let created = IERC6551Registry::AccountCreated {
            account,
            implementation: call.implementation,
            chainId: call.chainId,
            tokenContract: call.tokenContract,
            tokenId: call.tokenId,
            salt: call.salt,
        };
        return vec![Log {
            address: contracts.registry,
            data: created.encode_log_data(),
        }];
    }
    Vec::new()
}
