//! Runtime configuration: TOML file first, then `ESCROWFLOW_*` overrides.

use escrowflow_compliance::{DEFAULT_THRESHOLD, PolicyTable};
use escrowflow_ledger::{BPS_SCALE, LedgerSnapshot, Money};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::reasoning::{OllamaReasoner, Reasoner, ReasoningError, TemplateReasoner};
use crate::resources::DEFAULT_UPFRONT_BPS;

pub const ENV_THRESHOLD: &str = "ESCROWFLOW_THRESHOLD";
pub const ENV_UPFRONT_BPS: &str = "ESCROWFLOW_UPFRONT_BPS";
pub const ENV_DATA_DIR: &str = "ESCROWFLOW_DATA_DIR";
pub const ENV_REASONER: &str = "ESCROWFLOW_REASONER";
pub const ENV_REASONER_URL: &str = "ESCROWFLOW_REASONER_URL";
pub const ENV_REASONER_MODEL: &str = "ESCROWFLOW_REASONER_MODEL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    pub compliance: ComplianceConfig,
    pub escrow: EscrowSplitConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub reasoner: ReasonerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Amounts strictly above this need source of funds or go to escrow.
    pub threshold: Money,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowSplitConfig {
    pub upfront_bps: u32,
}

impl Default for EscrowSplitConfig {
    fn default() -> Self {
        Self {
            upfront_bps: DEFAULT_UPFRONT_BPS,
        }
    }
}

/// Opening balances, used when no ledger has been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub buyer: Money,
    pub seller: Money,
    pub escrow: Money,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            buyer: Money::from_major(10_000),
            seller: Money::ZERO,
            escrow: Money::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".escrowflow"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonerKind {
    #[default]
    Template,
    Ollama,
}

impl fmt::Display for ReasonerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReasonerKind::Template => "template",
            ReasonerKind::Ollama => "ollama",
        })
    }
}

impl FromStr for ReasonerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" | "offline" => Ok(ReasonerKind::Template),
            "ollama" => Ok(ReasonerKind::Ollama),
            other => Err(format!("expected `template` or `ollama`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub kind: ReasonerKind,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            kind: ReasonerKind::Template,
            base_url: "http://localhost:11434".to_string(),
            model: "gpt-oss:120b".to_string(),
            timeout_secs: 30,
        }
    }
}

fn invalid(key: &str, value: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl EscrowConfig {
    /// Read `path` if given (defaults otherwise), then apply the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `ESCROWFLOW_*` pairs; anything else is ignored.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                ENV_THRESHOLD => {
                    self.compliance.threshold =
                        value.parse().map_err(|e| invalid(key, value, e))?;
                }
                ENV_UPFRONT_BPS => {
                    self.escrow.upfront_bps =
                        value.trim().parse().map_err(|e| invalid(key, value, e))?;
                }
                ENV_DATA_DIR => self.storage.data_dir = PathBuf::from(value),
                ENV_REASONER => {
                    self.reasoner.kind = value.parse().map_err(|e| invalid(key, value, e))?;
                }
                ENV_REASONER_URL => self.reasoner.base_url = value.to_string(),
                ENV_REASONER_MODEL => self.reasoner.model = value.to_string(),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escrow.upfront_bps > BPS_SCALE {
            return Err(invalid(
                "escrow.upfront_bps",
                &self.escrow.upfront_bps.to_string(),
                format!("must be at most {BPS_SCALE}"),
            ));
        }
        if self.compliance.threshold.is_negative() {
            return Err(invalid(
                "compliance.threshold",
                &self.compliance.threshold.to_string(),
                "must not be negative",
            ));
        }
        for (key, amount) in [
            ("ledger.buyer", self.ledger.buyer),
            ("ledger.seller", self.ledger.seller),
            ("ledger.escrow", self.ledger.escrow),
        ] {
            if amount.is_negative() {
                return Err(invalid(key, &amount.to_string(), "must not be negative"));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> PolicyTable {
        PolicyTable::standard(self.compliance.threshold)
    }

    pub fn opening_balances(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(self.ledger.buyer, self.ledger.seller, self.ledger.escrow)
    }

    pub fn reasoner(&self) -> Result<Arc<Reasoner>, ReasoningError> {
        Ok(match self.reasoner.kind {
            ReasonerKind::Template => Arc::new(TemplateReasoner::new()),
            ReasonerKind::Ollama => Arc::new(OllamaReasoner::new(
                &self.reasoner.base_url,
                self.reasoner.model.clone(),
                Duration::from_secs(self.reasoner.timeout_secs),
            )?),
        })
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.storage.data_dir.join("checkpoints")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage.data_dir.join("ledger.json")
    }

    /// Lock file held by a process for as long as it works on `data_dir`.
    pub fn lock_path(&self) -> PathBuf {
        self.storage.data_dir.join(".lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowflow_compliance::{ComplianceStatus, Credentials};

    #[test]
    fn defaults_match_the_standard_deployment() {
        let config = EscrowConfig::default();
        assert_eq!(config.compliance.threshold, Money::from_major(1000));
        assert_eq!(config.escrow.upfront_bps, 2000);
        assert_eq!(config.ledger.buyer, Money::from_major(10_000));
        assert_eq!(config.reasoner.kind, ReasonerKind::Template);
        assert_eq!(config.ledger_path(), PathBuf::from(".escrowflow/ledger.json"));
        assert_eq!(config.lock_path(), PathBuf::from(".escrowflow/.lock"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EscrowConfig::from_toml_str(
            r#"
            [compliance]
            threshold = "250.00"

            [reasoner]
            kind = "ollama"
            model = "llama3"
            "#,
        )
        .unwrap();
        assert_eq!(config.compliance.threshold, Money::from_major(250));
        assert_eq!(config.escrow.upfront_bps, 2000);
        assert_eq!(config.reasoner.kind, ReasonerKind::Ollama);
        assert_eq!(config.reasoner.model, "llama3");
        assert_eq!(config.reasoner.base_url, "http://localhost:11434");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = EscrowConfig::from_toml_str("[escrow]\nupfront_bps = 5000\n").unwrap();
        config
            .apply_env([
                (ENV_UPFRONT_BPS, "2500"),
                (ENV_THRESHOLD, "2000"),
                (ENV_DATA_DIR, "/tmp/escrow"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();
        assert_eq!(config.escrow.upfront_bps, 2500);
        assert_eq!(config.compliance.threshold, Money::from_major(2000));
        assert_eq!(config.checkpoint_dir(), PathBuf::from("/tmp/escrow/checkpoints"));

        let policy = config.policy();
        assert_eq!(
            policy.evaluate(Money::from_major(1500), &Credentials::default()),
            ComplianceStatus::Pass
        );
    }

    #[test]
    fn bad_values_are_reported_with_their_key() {
        let mut config = EscrowConfig::default();
        let err = config
            .apply_env([(ENV_REASONER, "oracle")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_REASONER));

        let config = EscrowConfig::from_toml_str("[escrow]\nupfront_bps = 12000\n").unwrap();
        assert!(config.validate().is_err());

        assert!(matches!(
            EscrowConfig::from_toml_str("[escrow]\nupfront_bps = \"lots\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
