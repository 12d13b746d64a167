//! Server configuration read from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use snacks_chain::{FeeSchedule, SubmitterConfig};
use snacks_steps::ContractSet;

use crate::error::AppError;

const GWEI: u128 = 1_000_000_000;

/// Everything the binary needs to start.
#[derive(Clone)]
pub struct Config {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// JSON-RPC endpoint of the chain.
    pub rpc_http_url: String,
    /// Hex-encoded deployer key. Never logged.
    pub deployer_private_key: String,
    /// Deployed contracts and the chain they live on.
    pub contracts: ContractSet,
    /// Pointers new assets are minted with.
    pub base_pointers: Vec<String>,
    /// Gateway used to build image URLs.
    pub ipfs_gateway: String,
    /// Initial max fee per gas, in gwei.
    pub max_fee_gwei: u64,
    /// Initial max priority fee per gas, in gwei.
    pub max_priority_fee_gwei: u64,
    /// How long to wait for a receipt.
    pub confirmation_timeout: Duration,
    /// Evolve on checkins at restaurants without an attestation.
    pub evolve_without_attestation: bool,
    /// Redeliveries of an unconfirmed request before it is left for restart.
    pub max_redeliveries: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rpc_http_url", &self.rpc_http_url)
            .field("contracts", &self.contracts)
            .field("base_pointers", &self.base_pointers.len())
            .field("max_fee_gwei", &self.max_fee_gwei)
            .field("max_priority_fee_gwei", &self.max_priority_fee_gwei)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("evolve_without_attestation", &self.evolve_without_attestation)
            .field("max_redeliveries", &self.max_redeliveries)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env = Env(lookup);
        let base_pointers: Vec<String> = env
            .required("BASE_METADATA_POINTERS")?
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();
        if base_pointers.is_empty() {
            return Err(AppError::Config(
                "BASE_METADATA_POINTERS must list at least one pointer".into(),
            ));
        }

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            host: env.optional("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: env.parsed_or("PORT", 3000)?,
            rpc_http_url: env.required("RPC_HTTP_URL")?,
            deployer_private_key: env.required("DEPLOYER_PRIVATE_KEY")?,
            contracts: ContractSet {
                asset: env.parsed("TUMMY_NFT_ADDRESS")?,
                registry: env.parsed("ERC6551_REGISTRY_ADDRESS")?,
                account_implementation: env.parsed("ERC6551_ACCOUNT_ADDRESS")?,
                attestation: env.parsed("ATTESTATION_NFT_ADDRESS")?,
                chain_id: env.parsed_or("CHAIN_ID", 5)?,
            },
            base_pointers,
            ipfs_gateway: env
                .optional("IPFS_GATEWAY")
                .unwrap_or_else(|| "https://ipfs.io/ipfs".to_owned()),
            max_fee_gwei: env.parsed_or("MAX_FEE_GWEI", 20)?,
            max_priority_fee_gwei: env.parsed_or("MAX_PRIORITY_FEE_GWEI", 10)?,
            confirmation_timeout: Duration::from_secs(
                env.parsed_or("CONFIRMATION_TIMEOUT_SECS", 120)?,
            ),
            evolve_without_attestation: env.parsed_or("EVOLVE_WITHOUT_ATTESTATION", true)?,
            max_redeliveries: env.parsed_or("MAX_REDELIVERIES", 3)?,
        })
    }

    /// Submitter settings derived from the fee and timeout variables.
    #[must_use]
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            chain_id: self.contracts.chain_id,
            fees: FeeSchedule {
                max_fee_per_gas: u128::from(self.max_fee_gwei) * GWEI,
                max_priority_fee_per_gas: u128::from(self.max_priority_fee_gwei) * GWEI,
            },
            confirmation_timeout: self.confirmation_timeout,
            ..SubmitterConfig::default()
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, AppError> {
        self.optional(name)
            .ok_or_else(|| AppError::Config(format!("{name} environment variable must be set")))
    }

    fn parsed<T>(&self, name: &str) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        parse(name, &self.required(name)?)
    }

    fn parsed_or<T>(&self, name: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(name).map_or(Ok(default), |raw| parse(name, &raw))
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse()
        .map_err(|e| AppError::Config(format!("{name} is invalid: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy_primitives::Address;

    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/snacks".to_owned()),
            ("RPC_HTTP_URL", "http://localhost:8545".to_owned()),
            ("DEPLOYER_PRIVATE_KEY", KEY.to_owned()),
            ("TUMMY_NFT_ADDRESS", format!("0x{}", "a5".repeat(20))),
            ("ERC6551_REGISTRY_ADDRESS", format!("0x{}", "e6".repeat(20))),
            ("ERC6551_ACCOUNT_ADDRESS", format!("0x{}", "ac".repeat(20))),
            ("ATTESTATION_NFT_ADDRESS", format!("0x{}", "b7".repeat(20))),
            ("BASE_METADATA_POINTERS", "cid-a/604, cid-b/1,".to_owned()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<Config, AppError> {
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_defaults_apply_when_optional_variables_are_absent() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.contracts.chain_id, 5);
        assert_eq!(config.base_pointers, vec!["cid-a/604", "cid-b/1"]);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(120));
        assert!(config.evolve_without_attestation);
        assert_eq!(config.max_redeliveries, 3);
        assert_eq!(config.contracts.asset, Address::repeat_byte(0xa5));
    }

    #[test]
    fn test_submitter_config_converts_gwei_to_wei() {
        let mut env = base_env();
        env.insert("MAX_FEE_GWEI", "30".to_owned());
        env.insert("CHAIN_ID", "11155111".to_owned());

        let submitter = load(&env).unwrap().submitter_config();

        assert_eq!(submitter.fees.max_fee_per_gas, 30 * GWEI);
        assert_eq!(submitter.fees.max_priority_fee_per_gas, 10 * GWEI);
        assert_eq!(submitter.chain_id, 11_155_111);
    }

    #[test]
    fn test_missing_required_variable_is_named() {
        let mut env = base_env();
        env.remove("RPC_HTTP_URL");

        let err = load(&env).unwrap_err();

        assert!(err.to_string().contains("RPC_HTTP_URL"));
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let mut env = base_env();
        env.insert("TUMMY_NFT_ADDRESS", "0x1234".to_owned());

        let err = load(&env).unwrap_err();

        assert!(matches!(err, AppError::Config(msg) if msg.contains("TUMMY_NFT_ADDRESS")));
    }

    #[test]
    fn test_blank_pointer_list_is_rejected() {
        let mut env = base_env();
        env.insert("BASE_METADATA_POINTERS", " , ".to_owned());

        assert!(load(&env).is_err());
    }

    #[test]
    fn test_debug_output_omits_private_key() {
        let config = load(&base_env()).unwrap();

        let rendered = format!("{config:?}");

        assert!(!rendered.contains(&KEY[2..]));
        assert!(!rendered.contains("postgres://"));
    }
}
