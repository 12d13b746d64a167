//! Projection of step results onto an asset record.
//!
//! The ledger is the source of truth for what happened on chain; the asset
//! record is a projection of it. Applying a result is idempotent, so every
//! delivery can re-apply all completed results before doing new work.

use chrono::{DateTime, Utc};
use snacks_core::asset::{AssetRecord, AttestationRecord, LifecycleState};
use snacks_core::workflow::StepResult;

/// Applies `result` to `record`. Returns `true` if the record changed.
pub fn apply(record: &mut AssetRecord, result: &StepResult, now: DateTime<Utc>) -> bool {
    let before = record.clone();
    match result {
        StepResult::AssetMinted { token_id, pointer } => {
            if record.token_id.is_none() {
                record.token_id = Some(*token_id);
                record.metadata_pointer = Some(pointer.clone());
            }
            advance(record, LifecycleState::Minted);
        }
        StepResult::AccountBound { account } => {
            if record.bound_account.is_none() {
                record.bound_account = Some(*account);
            }
            advance(record, LifecycleState::Bound);
        }
        StepResult::AttestationMinted {
            restaurant_id,
            pointer,
            token_id,
            issued_at,
        } => {
            if record.attestation_for(restaurant_id).is_none() {
                record.attestations.push(AttestationRecord {
                    restaurant_id: restaurant_id.clone(),
                    pointer: pointer.clone(),
                    token_id: *token_id,
                    issued_at: *issued_at,
                });
            }
            visit(record, restaurant_id);
        }
        StepResult::AttestationSkipped { restaurant_id } => visit(record, restaurant_id),
        StepResult::AssetEvolved { from, to } => {
            if record.metadata_pointer.as_deref() == Some(from.as_str()) {
                record.metadata_pointer = Some(to.clone());
            }
            if record.metadata_pointer.as_deref() == Some(to.as_str()) {
                advance(record, LifecycleState::Evolved);
            }
        }
        StepResult::EvolutionSkipped => {}
    }

    let changed = *record != before;
    if changed {
        record.updated_at = now;
    }
    changed
}

fn advance(record: &mut AssetRecord, state: LifecycleState) {
    record.state = record.state.max(state);
}

fn visit(record: &mut AssetRecord, restaurant_id: &str) {
    if !record.visited_restaurants.iter().any(|r| r == restaurant_id) {
        record.visited_restaurants.push(restaurant_id.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};
    use chrono::TimeZone;
    use snacks_core::wallet::WalletAddress;

    use super::*;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn later() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 11, 0, 0).unwrap()
    }

    fn record() -> AssetRecord {
        let wallet: WalletAddress = "0x0000000000000000000000000000000000000abc".parse().unwrap();
        AssetRecord::new(wallet, created())
    }

    fn minted() -> StepResult {
        StepResult::AssetMinted {
            token_id: U256::from(7),
            pointer: "cid/604".into(),
        }
    }

    #[test]
    fn test_mint_then_bind_reaches_bound() {
        let mut record = record();

        assert!(apply(&mut record, &minted(), later()));
        assert!(apply(
            &mut record,
            &StepResult::AccountBound {
                account: Address::repeat_byte(0x11)
            },
            later()
        ));

        assert_eq!(record.state, LifecycleState::Bound);
        assert_eq!(record.token_id, Some(U256::from(7)));
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/604"));
        assert_eq!(record.bound_account, Some(Address::repeat_byte(0x11)));
        assert_eq!(record.updated_at, later());
    }

    #[test]
    fn test_reapplying_results_changes_nothing() {
        let mut record = record();
        apply(&mut record, &minted(), later());
        let snapshot = record.clone();

        assert!(!apply(&mut record, &minted(), created()));
        assert_eq!(record, snapshot);
    }

    #[test]
    fn test_token_id_is_never_overwritten() {
        let mut record = record();
        apply(&mut record, &minted(), later());

        apply(
            &mut record,
            &StepResult::AssetMinted {
                token_id: U256::from(8),
                pointer: "cid/1".into(),
            },
            later(),
        );

        assert_eq!(record.token_id, Some(U256::from(7)));
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/604"));
    }

    #[test]
    fn test_evolution_applies_once() {
        let mut record = record();
        apply(&mut record, &minted(), later());
        let evolved = StepResult::AssetEvolved {
            from: "cid/604".into(),
            to: "cid/605".into(),
        };

        apply(&mut record, &evolved, later());
        apply(&mut record, &evolved, later());

        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/605"));
        assert_eq!(record.state, LifecycleState::Evolved);
    }

    #[test]
    fn test_stale_evolution_does_not_rewind_pointer() {
        let mut record = record();
        apply(&mut record, &minted(), later());
        apply(
            &mut record,
            &StepResult::AssetEvolved {
                from: "cid/604".into(),
                to: "cid/605".into(),
            },
            later(),
        );
        apply(
            &mut record,
            &StepResult::AssetEvolved {
                from: "cid/605".into(),
                to: "cid/606".into(),
            },
            later(),
        );

        let changed = apply(
            &mut record,
            &StepResult::AssetEvolved {
                from: "cid/604".into(),
                to: "cid/605".into(),
            },
            later(),
        );

        assert!(!changed);
        assert_eq!(record.metadata_pointer.as_deref(), Some("cid/606"));
    }

    #[test]
    fn test_checkins_record_visits_and_one_attestation_per_restaurant() {
        let mut record = record();
        let attested = StepResult::AttestationMinted {
            restaurant_id: "le-comptoir".into(),
            pointer: "poap/1".into(),
            token_id: Some(U256::from(500)),
            issued_at: later(),
        };

        apply(&mut record, &attested, later());
        apply(&mut record, &attested, later());
        apply(
            &mut record,
            &StepResult::AttestationSkipped {
                restaurant_id: "chez-janou".into(),
            },
            later(),
        );

        assert_eq!(record.visited_restaurants, vec!["le-comptoir", "chez-janou"]);
        assert_eq!(record.attestations.len(), 1);
        assert!(record.attestation_for("le-comptoir").is_some());
        assert!(record.attestation_for("chez-janou").is_none());
    }
}
