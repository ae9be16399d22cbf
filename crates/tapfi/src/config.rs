use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::cache::CACHE_DURATION;
use crate::chains::ChainRegistry;
use crate::debounce::BALANCE_DEBOUNCE;
use crate::error::Error;
use crate::poller::PollPolicy;

pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_CHAIN_ID: u64 = 11155111;
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Runtime settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub alchemy_api_key: Option<String>,
    pub etherscan_api_key: Option<String>,
    /// JSON-RPC endpoint used for receipts.
    pub rpc_url: Option<String>,
    pub app_origin: String,
    /// TapFi backend holding payment requests.
    pub api_base_url: String,
    pub default_chain_id: u64,
    pub token_cache_ttl: Duration,
    pub balance_debounce: Duration,
    pub poll: PollPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alchemy_api_key: None,
            etherscan_api_key: None,
            rpc_url: None,
            app_origin: DEFAULT_ORIGIN.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            default_chain_id: DEFAULT_CHAIN_ID,
            token_cache_ttl: CACHE_DURATION,
            balance_debounce: BALANCE_DEBOUNCE,
            poll: PollPolicy::default(),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, Error> {
        if dotenv::dotenv().is_ok() {
            debug!("loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let rpc_url = var("RPC_URL").or_else(|| {
            var("INFURA_API_KEY").map(|key| format!("https://sepolia.infura.io/v3/{key}"))
        });

        let config = Self {
            alchemy_api_key: var("ALCHEMY_API_KEY"),
            etherscan_api_key: var("ETHERSCAN_API_KEY"),
            rpc_url,
            app_origin: var("APP_ORIGIN").unwrap_or(defaults.app_origin),
            api_base_url: var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            default_chain_id: parse_var(&var, "DEFAULT_CHAIN_ID")?
                .unwrap_or(defaults.default_chain_id),
            token_cache_ttl: millis_var(&var, "TOKEN_CACHE_TTL_MS")?
                .unwrap_or(defaults.token_cache_ttl),
            balance_debounce: millis_var(&var, "BALANCE_DEBOUNCE_MS")?
                .unwrap_or(defaults.balance_debounce),
            poll: PollPolicy {
                interval: millis_var(&var, "POLL_INTERVAL_MS")?.unwrap_or(defaults.poll.interval),
                max_consecutive_errors: parse_var(&var, "POLL_MAX_ERRORS")?
                    .unwrap_or(defaults.poll.max_consecutive_errors),
                ..defaults.poll
            },
        };
        Ok(config)
    }

    /// Check the settings against `chains`.
    pub fn validate(&self, chains: &ChainRegistry) -> Result<(), Error> {
        if !chains.contains(self.default_chain_id) {
            return Err(Error::Config(format!(
                "DEFAULT_CHAIN_ID {} is not a supported chain",
                self.default_chain_id
            )));
        }
        Url::parse(&self.app_origin)
            .map_err(|e| Error::Config(format!("APP_ORIGIN {}: {e}", self.app_origin)))?;
        let api = Url::parse(&self.api_base_url)
            .map_err(|e| Error::Config(format!("API_BASE_URL {}: {e}", self.api_base_url)))?;
        if api.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "API_BASE_URL {} cannot hold a path",
                self.api_base_url
            )));
        }
        if let Some(rpc_url) = &self.rpc_url {
            Url::parse(rpc_url).map_err(|e| Error::Config(format!("RPC_URL: {e}")))?;
        }
        for (name, value) in [
            ("TOKEN_CACHE_TTL_MS", self.token_cache_ttl),
            ("BALANCE_DEBOUNCE_MS", self.balance_debounce),
            ("POLL_INTERVAL_MS", self.poll.interval),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn require_alchemy_key(&self) -> Result<&str, Error> {
        self.alchemy_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("ALCHEMY_API_KEY is not set".to_string()))
    }

    pub fn require_rpc_url(&self) -> Result<&str, Error> {
        self.rpc_url
            .as_deref()
            .ok_or_else(|| Error::Config("set RPC_URL or INFURA_API_KEY".to_string()))
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

fn millis_var<F>(var: &F, key: &str) -> Result<Option<Duration>, Error>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<u64, F>(var, key)?.map(Duration::from_millis))
}
