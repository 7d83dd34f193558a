//! Access control configuration, as processed from the `[access_control]`
//! table of the server configuration, or from a standalone toml file.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use sketching::tracing::Subscriber;
use sketching::LogLevel;

use crate::prelude::*;
use crate::schema::MAX_SUPERIOR_DEPTH;

fn default_enabled() -> bool {
    true
}

fn default_bypass_dns() -> Vec<String> {
    vec![DEFAULT_ADMIN_DN.to_string()]
}

fn default_max_superior_depth() -> usize {
    MAX_SUPERIOR_DEPTH
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AccessControlConfig {
    /// When false, every decision is Allowed. Only for bootstrapping a
    /// directory that has no ACI yet.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Principals that bypass access control entirely.
    #[serde(default = "default_bypass_dns")]
    pub bypass_dns: Vec<String>,
    /// Resolve precedence ties by X.501 specificity instead of letting denials
    /// win.
    #[serde(default)]
    pub specificity_tiebreak: bool,
    #[serde(default = "default_max_superior_depth")]
    pub max_superior_depth: usize,
    pub log_level: Option<LogLevel>,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        AccessControlConfig {
            enabled: default_enabled(),
            bypass_dns: default_bypass_dns(),
            specificity_tiebreak: false,
            max_superior_depth: default_max_superior_depth(),
            log_level: None,
        }
    }
}

impl AccessControlConfig {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, OperationError> {
        let mut f = File::open(config_path.as_ref()).map_err(|e| {
            admin_error!(?e, path = ?config_path.as_ref(), "Unable to open config file");
            OperationError::FsError
        })?;

        let mut contents = String::new();
        f.read_to_string(&mut contents).map_err(|e| {
            admin_error!(?e, "unable to read contents");
            OperationError::FsError
        })?;

        Self::from_toml_str(contents.as_str())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, OperationError> {
        let config: AccessControlConfig = toml::from_str(contents).map_err(|e| {
            admin_error!(?e, "unable to parse config");
            OperationError::InvalidConfig(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), OperationError> {
        if self.max_superior_depth == 0 {
            return Err(OperationError::InvalidConfig(
                "max_superior_depth must be at least 1".to_string(),
            ));
        }
        self.bypass_dn_set().map(|_| ())
    }

    /// The subscriber an embedding server should install for this
    /// configuration's log level.
    pub fn logging_pipeline(&self) -> Box<dyn Subscriber + Send + Sync> {
        sketching::start_logging_pipeline(self.log_level.unwrap_or_default())
    }

    /// The normalised bypass DNs.
    pub fn bypass_dn_set(&self) -> Result<BTreeSet<Dn>, OperationError> {
        self.bypass_dns
            .iter()
            .map(|s| {
                Dn::from_str(s).map_err(|_| {
                    OperationError::InvalidConfig(format!("invalid bypass dn {}", s))
                })
            })
            .collect()
    }
}
