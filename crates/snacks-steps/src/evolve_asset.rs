//! Step 4: advance the asset's metadata pointer.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use snacks_core::chain::UnsignedTx;
use snacks_core::workflow::StepResult;

use crate::STEP_GAS_LIMIT;
use crate::contracts::{ContractSet, ITummyNft};
use crate::error::StepError;
use crate::pointer::next_pointer;

/// A built evolution: the transaction and the result it produces once
/// included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evolution {
    /// `setTokenURI(tokenId, next)` on the asset contract.
    pub tx: UnsignedTx,
    /// Pointer before and after.
    pub result: StepResult,
}

/// Builds `setTokenURI(tokenId, next_pointer(current))`.
///
/// # Errors
///
/// Returns `StepError::NonNumericPointer` when `current` cannot be
/// incremented; nothing should be submitted in that case.
pub fn build(
    contracts: &ContractSet,
    token_id: U256,
    current: &str,
) -> Result<Evolution, StepError> {
    let next = next_pointer(current)?;
    let call = ITummyNft::setTokenURICall {
        tokenId: token_id,
        tokenURI: next.clone(),
    };
    Ok(Evolution {
        tx: UnsignedTx {
            to: contracts.asset,
            input: Bytes::from(call.abi_encode()),
            value: U256::ZERO,
            gas_limit: STEP_GAS_LIMIT,
        },
        result: StepResult::AssetEvolved {
            from: current.to_owned(),
            to: next,
        },
    })
}

/// Recovers the pointer an evolution transaction sets.
#[must_use]
pub fn pointer_of(tx: &UnsignedTx) -> Option<String> {
    ITummyNft::setTokenURICall::abi_decode(&tx.input)
        .ok()
        .map(|call| call.tokenURI)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, address};

    use super::*;

    fn contracts() -> ContractSet {
        ContractSet {
            asset: address!("0x00000000000000000000000000000000000000a5"),
            registry: Address::ZERO,
            account_implementation: Address::ZERO,
            attestation: Address::ZERO,
            chain_id: 5,
        }
    }

    #[test]
    fn test_build_sets_incremented_pointer() {
        let evolution = build(&contracts(), U256::from(4), "cid/7").unwrap();

        assert_eq!(evolution.tx.to, contracts().asset);
        let call = ITummyNft::setTokenURICall::abi_decode(&evolution.tx.input).unwrap();
        assert_eq!(call.tokenId, U256::from(4));
        assert_eq!(call.tokenURI, "cid/8");
        assert_eq!(pointer_of(&evolution.tx).as_deref(), Some("cid/8"));
        assert_eq!(
            evolution.result,
            StepResult::AssetEvolved {
                from: "cid/7".into(),
                to: "cid/8".into()
            }
        );
    }

    #[test]
    fn test_build_fails_on_non_numeric_pointer() {
        let err = build(&contracts(), U256::from(4), "cid/latest").unwrap_err();
        assert_eq!(err, StepError::NonNumericPointer("cid/latest".into()));
    }
}
