//! Off-chain derivation of ERC-6551 token-bound account addresses.

use alloy_primitives::{Address, B256, U256, hex, keccak256};

const PROXY_PREFIX: [u8; 20] = hex!("3d60ad80600a3d3981f3363d3d373d3d3d363d73");
const PROXY_SUFFIX: [u8; 15] = hex!("5af43d82803e903d91602b57fd5bf3");

/// Creation code the registry deploys for one account: an EIP-1167 style
/// proxy to `implementation` followed by the ABI-encoded account context.
#[must_use]
pub fn account_creation_code(
    implementation: Address,
    chain_id: u64,
    token_contract: Address,
    token_id: U256,
    salt: U256,
) -> Vec<u8> {
    let mut code = Vec::with_capacity(PROXY_PREFIX.len() + 20 + PROXY_SUFFIX.len() + 128);
    code.extend_from_slice(&PROXY_PREFIX);
    code.extend_from_slice(implementation.as_slice());
    code.extend_from_slice(&PROXY_SUFFIX);
    code.extend_from_slice(&salt.to_be_bytes::<32>());
    code.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    code.extend_from_slice(token_contract.into_word().as_slice());
    code.extend_from_slice(&token_id.to_be_bytes::<32>());
    code
}

/// Address the registry at `registry` deploys (or deployed) the account to,
/// computed with CREATE2 exactly as the registry's `account` view does.
#[must_use]
pub fn token_bound_address(
    registry: Address,
    implementation: Address,
    chain_id: u64,
    token_contract: Address,
    token_id: U256,
    salt: U256,
) -> Address {
    let code = account_creation_code(implementation, chain_id, token_contract, token_id, salt);
    registry.create2(B256::from(salt), keccak256(&code))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    const REGISTRY: Address = address!("0x02101dfB77FDE026414827Fdc604ddAF224F0921");
    const IMPLEMENTATION: Address = address!("0x2D25602551487C3f3354dD80D76D54383A243358");
    const TOKEN: Address = address!("0x00000000000000000000000000000000000000a5");

    #[test]
    fn test_creation_code_layout() {
        let code = account_creation_code(IMPLEMENTATION, 5, TOKEN, U256::from(7), U256::from(1));

        assert_eq!(code.len(), 183);
        assert_eq!(&code[..20], PROXY_PREFIX.as_slice());
        assert_eq!(&code[20..40], IMPLEMENTATION.as_slice());
        assert_eq!(&code[40..55], PROXY_SUFFIX.as_slice());
        assert_eq!(code[86], 1, "salt word");
        assert_eq!(code[118], 5, "chain id word");
        assert_eq!(&code[131..151], TOKEN.as_slice());
        assert_eq!(code[182], 7, "token id word");
    }

    #[test]
    fn test_address_is_deterministic_per_token() {
        let a = token_bound_address(REGISTRY, IMPLEMENTATION, 5, TOKEN, U256::from(1), U256::from(1));
        let b = token_bound_address(REGISTRY, IMPLEMENTATION, 5, TOKEN, U256::from(1), U256::from(1));
        let other = token_bound_address(REGISTRY, IMPLEMENTATION, 5, TOKEN, U256::from(2), U256::from(1));

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_ne!(a, Address::ZERO);
    }

    #[test]
    fn test_address_depends_on_registry_and_chain() {
        let base = token_bound_address(REGISTRY, IMPLEMENTATION, 5, TOKEN, U256::from(1), U256::from(1));
        let other_chain =
            token_bound_address(REGISTRY, IMPLEMENTATION, 1, TOKEN, U256::from(1), U256::from(1));
        let other_registry =
            token_bound_address(TOKEN, IMPLEMENTATION, 5, TOKEN, U256::from(1), U256::from(1));

        assert_ne!(base, other_chain);
        assert_ne!(base, other_registry);
    }
}
