//! Ingress rule files.
//!
//! Two shapes are understood:
//! - delimited text, one `address,description` per line, expanded over a
//!   shared list of ports and a single protocol
//! - a JSON document whose `rules` list carries every field per record

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SgError};

pub const DEFAULT_PROTOCOL: &str = "tcp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Source CIDR, e.g. `10.0.0.1/32`
    #[serde(rename = "ip")]
    pub address: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub description: String,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl IngressRule {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        protocol: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            protocol: protocol.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RuleFormat {
    /// Structured for `.json` files, delimited otherwise
    #[default]
    Auto,
    /// `address,description` per line
    Delimited,
    /// JSON document with a `rules` list
    Structured,
}

impl RuleFormat {
    /// Resolve `Auto` against the file name.
    pub fn resolve(self, path: &Path) -> Self {
        match self {
            RuleFormat::Auto => {
                let is_json = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
                if is_json {
                    RuleFormat::Structured
                } else {
                    RuleFormat::Delimited
                }
            }
            other => other,
        }
    }
}

/// Where the rules for an `add` run come from.
#[derive(Debug, Clone)]
pub struct RulesSource {
    pub path: PathBuf,
    pub format: RuleFormat,
    /// Delimited format only
    pub ports: Vec<u16>,
    /// Delimited format only
    pub protocol: String,
}

impl RulesSource {
    pub fn load(&self) -> Result<Vec<IngressRule>> {
        let rules = match self.format.resolve(&self.path) {
            RuleFormat::Structured => load_structured(&self.path)?,
            _ => load_delimited(&self.path, &self.ports, &self.protocol)?,
        };
        log::info!("loaded {} ingress rule(s) from {}", rules.len(), self.path.display());
        Ok(rules)
    }
}

/// Parse a comma-separated port list such as `22,443`.
pub fn parse_ports(list: &str) -> Result<Vec<u16>> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(SgError::InvalidPort {
                value: p.to_string(),
            }),
        })
        .collect()
}

pub fn load_delimited(path: &Path, ports: &[u16], protocol: &str) -> Result<Vec<IngressRule>> {
    let content = std::fs::read_to_string(path).map_err(|source| SgError::RulesRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_delimited(&content, ports, protocol).map_err(|(line, reason)| SgError::RulesParse {
        path: path.to_path_buf(),
        line: Some(line),
        reason,
    })
}

/// Expand `address,description` lines over `ports`, port-major, keeping file
/// order within each port.
fn parse_delimited(
    content: &str,
    ports: &[u16],
    protocol: &str,
) -> std::result::Result<Vec<IngressRule>, (usize, String)> {
    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            log::debug!("skipping blank line {}", idx + 1);
            continue;
        }
        let Some((address, description)) = line.split_once(',') else {
            return Err((idx + 1, format!("expected `address,description`, got {line:?}")));
        };
        entries.push((address.trim(), description.trim()));
    }

    let mut rules = Vec::with_capacity(entries.len() * ports.len());
    for &port in ports {
        for (address, description) in &entries {
            rules.push(IngressRule::new(*address, port, protocol, *description));
        }
    }
    Ok(rules)
}

#[derive(Deserialize)]
struct RulesDocument {
    #[serde(alias = "ips")]
    rules: Vec<IngressRule>,
}

pub fn load_structured(path: &Path) -> Result<Vec<IngressRule>> {
    let content = std::fs::read_to_string(path).map_err(|source| SgError::RulesRead {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: RulesDocument =
        serde_json::from_str(&content).map_err(|e| SgError::RulesParse {
            path: path.to_path_buf(),
            line: Some(e.line()),
            reason: e.to_string(),
        })?;

    if let Some(rule) = doc.rules.iter().find(|r| r.port == 0) {
        return Err(SgError::RulesParse {
            path: path.to_path_buf(),
            line: None,
            reason: format!("rule for {} has port 0", rule.address),
        });
    }
    Ok(doc.rules)
}
