//! Step 3: mint a proof-of-visit attestation into the bound account.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use chrono::{DateTime, Utc};
use snacks_core::asset::Restaurant;
use snacks_core::chain::{TxReceipt, UnsignedTx};
use snacks_core::workflow::StepResult;

use crate::STEP_GAS_LIMIT;
use crate::contracts::{ContractSet, ITummyNft};
use crate::mint_asset::minted_token_id;

/// Builds `mintNFT(boundAccount, attestationPointer)` on the attestation
/// contract, or `None` when the restaurant has no attestation configured.
#[must_use]
pub fn build(
    contracts: &ContractSet,
    bound_account: Address,
    restaurant: &Restaurant,
) -> Option<UnsignedTx> {
    if !restaurant.has_attestation() {
        return None;
    }
    let call = ITummyNft::mintNFTCall {
        recipient: bound_account,
        tokenURI: restaurant.attestation_pointer.trim().to_owned(),
    };
    Some(UnsignedTx {
        to: contracts.attestation,
        input: Bytes::from(call.abi_encode()),
        value: U256::ZERO,
        gas_limit: STEP_GAS_LIMIT,
    })
}

/// Result recorded when no attestation is minted.
#[must_use]
pub fn skipped(restaurant: &Restaurant) -> StepResult {
    StepResult::AttestationSkipped {
        restaurant_id: restaurant.id.clone(),
    }
}

/// Extracts the step result from the attestation mint's receipt. The token id
/// is optional: attestation contracts are not required to emit `Transfer`.
#[must_use]
pub fn extract(
    contracts: &ContractSet,
    bound_account: Address,
    restaurant: &Restaurant,
    receipt: &TxReceipt,
    issued_at: DateTime<Utc>,
) -> StepResult {
    StepResult::AttestationMinted {
        restaurant_id: restaurant.id.clone(),
        pointer: restaurant.attestation_pointer.trim().to_owned(),
        token_id: minted_token_id(receipt, contracts.attestation, bound_account),
        issued_at,
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, address};
    use chrono::TimeZone;

    use super::*;

    const ACCOUNT: Address = address!("0x0000000000000000000000000000000000000acc");

    fn contracts() -> ContractSet {
        ContractSet {
            asset: address!("0x00000000000000000000000000000000000000a5"),
            registry: Address::ZERO,
            account_implementation: Address::ZERO,
            attestation: address!("0x00000000000000000000000000000000000000b7"),
            chain_id: 5,
        }
    }

    fn restaurant(pointer: &str) -> Restaurant {
        Restaurant {
            id: "le-comptoir".into(),
            name: "Le Comptoir".into(),
            attestation_pointer: pointer.into(),
        }
    }

    #[test]
    fn test_build_mints_into_bound_account() {
        let tx = build(&contracts(), ACCOUNT, &restaurant("poap/12")).unwrap();

        assert_eq!(tx.to, contracts().attestation);
        let call = ITummyNft::mintNFTCall::abi_decode(&tx.input).unwrap();
        assert_eq!(call.recipient, ACCOUNT);
        assert_eq!(call.tokenURI, "poap/12");
    }

    #[test]
    fn test_build_is_none_without_attestation_pointer() {
        assert!(build(&contracts(), ACCOUNT, &restaurant("")).is_none());
        assert!(build(&contracts(), ACCOUNT, &restaurant("  ")).is_none());
        assert_eq!(
            skipped(&restaurant("")),
            StepResult::AttestationSkipped {
                restaurant_id: "le-comptoir".into()
            }
        );
    }

    #[test]
    fn test_extract_without_transfer_event_has_no_token_id() {
        let issued_at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let receipt = TxReceipt {
            tx_hash: B256::ZERO,
            block_number: 3,
            success: true,
            logs: Vec::new(),
        };

        let result = extract(&contracts(), ACCOUNT, &restaurant("poap/12"), &receipt, issued_at);

        assert_eq!(
            result,
            StepResult::AttestationMinted {
                restaurant_id: "le-comptoir".into(),
                pointer: "poap/12".into(),
                token_id: None,
                issued_at,
            }
        );
    }
}
