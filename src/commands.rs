//! The `list` and `add` actions, composed from the loaders, the remote
//! service and the reconciler.

use std::io::Write;

use clap::ValueEnum;
use colored::*;
use serde_json::Value;

use crate::aws::{self, SecurityGroupService, ServiceError, GROUP_NOT_FOUND, MALFORMED_GROUP_ID};
use crate::config::RegionProfile;
use crate::error::{Result, SgError};
use crate::reconcile;
use crate::rules::RulesSource;

pub const SUCCESS_LINE: &str = "Successfully set security group ingress";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Describe the security groups and print the response
    #[default]
    List,
    /// Add the ingress rules from the rules file
    Add,
}

/// Group ids from the `--sg` override, or the profile's default group.
pub fn resolve_group_ids(sg_flag: Option<&str>, profile: &RegionProfile) -> Vec<String> {
    let ids: Vec<String> = sg_flag
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        vec![profile.security_group_id.clone()]
    } else {
        ids
    }
}

/// Describe `group_ids`, which also confirms they exist.
pub fn describe_groups<S>(service: &S, group_ids: &[String]) -> Result<Value>
where
    S: SecurityGroupService + ?Sized,
{
    service
        .describe_security_groups(group_ids)
        .map_err(|e| match e {
            ServiceError::Api { ref code, ref message }
                if code == MALFORMED_GROUP_ID || code == GROUP_NOT_FOUND =>
            {
                SgError::RemoteLookup(format!("{message}."))
            }
            other => SgError::RemoteLookup(format!(
                "Unable to get descriptions for security groups, {other}"
            )),
        })
}

pub fn list<S, O>(service: &S, group_ids: &[String], out: &mut O) -> Result<()>
where
    S: SecurityGroupService + ?Sized,
    O: Write + ?Sized,
{
    let description = describe_groups(service, group_ids)?;
    let rendered = serde_json::to_string_pretty(&description)
        .unwrap_or_else(|_| description.to_string());
    writeln!(out, "{rendered}")?;
    Ok(())
}

/// Apply the rules from `source` to every described group, in response order.
/// `err_color` says whether `err` is a terminal.
pub fn add<S, O, E>(
    service: &S,
    group_ids: &[String],
    source: &RulesSource,
    out: &mut O,
    err: &mut E,
    err_color: bool,
) -> Result<()>
where
    S: SecurityGroupService + ?Sized,
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let description = describe_groups(service, group_ids)?;
    let rules = source.load()?;

    for group_id in aws::group_ids(&description) {
        log::info!("applying {} rule(s) to {group_id}", rules.len());
        reconcile::apply_rules(service, &group_id, &rules, err, err_color)?;
        writeln!(out, "{}", SUCCESS_LINE.green())?;
    }
    Ok(())
}
