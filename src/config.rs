//! Region configuration: a JSON object mapping a short region key
//! (`pdx`, `iad`, ...) to the AWS region code and default security group.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SgError};

/// One entry of the region configuration file.
///
/// Field contents are not validated; an empty region code only fails later
/// when the remote service is called.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegionProfile {
    #[serde(rename = "region")]
    pub region_code: String,
    #[serde(rename = "sg")]
    pub security_group_id: String,
    #[serde(rename = "vpc")]
    pub vpc_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RegionConfig {
    profiles: HashMap<String, RegionProfile>,
}

impl RegionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SgError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| SgError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.is_empty() {
            log::warn!("{} has no region profiles", path.display());
        } else {
            log::info!(
                "loaded {} region profile(s) from {}",
                config.len(),
                path.display()
            );
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Look up a region key.
    ///
    /// An unknown key yields an empty profile rather than an error.
    pub fn profile(&self, key: &str) -> RegionProfile {
        match self.profiles.get(key) {
            Some(profile) => profile.clone(),
            None => {
                log::warn!("region {key:?} is not in the configuration; using an empty profile");
                RegionProfile::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
