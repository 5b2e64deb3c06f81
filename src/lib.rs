//! Inspect EC2 security groups and add ingress rules to them from a file.
//!
//! - [`config`] maps short region keys to region codes and default groups
//! - [`rules`] reads delimited or JSON rule files
//! - [`aws`] talks to EC2 through the `aws` command-line client
//! - [`reconcile`] applies rules one request at a time
//! - [`commands`] wires the above into the `list` and `add` actions

pub mod aws;
pub mod commands;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod rules;

pub use aws::{AwsCli, SecurityGroupService, ServiceError};
pub use commands::{Action, SUCCESS_LINE};
pub use config::{RegionConfig, RegionProfile};
pub use error::{Result, SgError};
pub use reconcile::{apply_rules, ReconcileReport, RuleOutcome};
pub use rules::{IngressRule, RuleFormat, RulesSource};
