use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::amount::AmountBounds;
use crate::errors::{DonationError, DonationResult};
use crate::network::ChainId;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DonationConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub contract: ContractConfig,
    #[serde(default)]
    pub amount: AmountConfig,
    #[serde(default)]
    pub estimate: EstimateConfig,
    #[serde(default)]
    pub redirect: RedirectConfig,
    /// Optional TOML file overriding the embedded UI messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_path: Option<PathBuf>,
}

impl DonationConfig {
    /// Load a configuration, rejecting unknown keys and invalid values.
    pub fn load(path: &Path) -> DonationResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = parse_strict(&content, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> DonationResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| DonationError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn validate(&self) -> DonationResult<()> {
        if !(self.amount.min > 0.0) || !self.amount.max.is_finite() {
            return Err(DonationError::Config(
                "amount.min must be greater than zero and amount.max finite".to_string(),
            ));
        }
        if self.amount.min > self.amount.max {
            return Err(DonationError::Config(format!(
                "amount.min ({}) exceeds amount.max ({})",
                self.amount.min, self.amount.max
            )));
        }
        if !(self.estimate.conversion_factor > 0.0) || !(self.estimate.price_per_unit >= 0.0) {
            return Err(DonationError::Config(
                "estimate.conversion_factor must be positive and estimate.price_per_unit non-negative"
                    .to_string(),
            ));
        }
        if self.contract.address.trim().is_empty() {
            return Err(DonationError::Config(
                "contract.address must not be empty".to_string(),
            ));
        }
        if self.contract.method.trim().is_empty() {
            return Err(DonationError::Config(
                "contract.method must not be empty".to_string(),
            ));
        }
        if !self.redirect.route_prefix.starts_with('/') {
            return Err(DonationError::Config(format!(
                "redirect.route_prefix `{}` must start with `/`",
                self.redirect.route_prefix
            )));
        }
        Ok(())
    }

    pub fn amount_bounds(&self) -> AmountBounds {
        AmountBounds::new(self.amount.min, self.amount.max)
    }
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            contract: ContractConfig::default(),
            amount: AmountConfig::default(),
            estimate: EstimateConfig::default(),
            redirect: RedirectConfig::default(),
            messages_path: None,
        }
    }
}

fn parse_strict<T: DeserializeOwned>(content: &str, path: &Path) -> DonationResult<T> {
    let mut unknown_keys = Vec::new();
    let deserializer = toml::de::Deserializer::new(content);
    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown_keys.push(path.to_string());
    })
    .map_err(|err| {
        DonationError::Config(format!("unable to parse config {}: {err}", path.display()))
    })?;

    if !unknown_keys.is_empty() {
        return Err(DonationError::Config(format!(
            "invalid config {}: unknown configuration key(s): {}",
            path.display(),
            unknown_keys.join(", ")
        )));
    }

    Ok(value)
}

/// Chain the campaign contract is deployed on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub chain_id: ChainId,
    /// Human readable name used in the "switch network" prompt.
    pub network_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: ChainId(1),
            network_name: "Ethereum Mainnet".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContractConfig {
    pub address: String,
    pub method: String,
    /// Name of the event whose third argument carries the minted token id.
    pub mint_event: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            address: "0x0000000000000000000000000000000000000000".to_string(),
            method: "donate".to_string(),
            mint_event: "Transfer".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AmountConfig {
    pub min: f64,
    pub max: f64,
}

impl Default for AmountConfig {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 100.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimateConfig {
    /// Fiat value of one unit of the native currency.
    pub price_per_unit: f64,
    /// Fiat cost of one hectare.
    pub conversion_factor: f64,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            price_per_unit: 3_500.0,
            conversion_factor: 8_000.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedirectConfig {
    pub delay_ms: u64,
    pub route_prefix: String,
}

impl RedirectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 2_000,
            route_prefix: "/donation".to_string(),
        }
    }
}
