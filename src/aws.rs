use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::rules::IngressRule;

pub const DUPLICATE_PERMISSION: &str = "InvalidPermission.Duplicate";
pub const MALFORMED_GROUP_ID: &str = "InvalidGroupId.Malformed";
pub const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";

pub const DEFAULT_AWS_CLI: &str = "aws";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("({code}) {message}")]
    Api { code: String, message: String },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServiceError {
    /// The EC2 error code, when the service reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ServiceError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.code() == Some(DUPLICATE_PERMISSION)
    }
}

/// The two EC2 security-group operations this tool needs.
pub trait SecurityGroupService {
    /// Returns the raw `DescribeSecurityGroups` document.
    fn describe_security_groups(&self, group_ids: &[String]) -> Result<Value, ServiceError>;

    /// Authorize a single ingress permission on `group_id`.
    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<(), ServiceError>;
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct IpPermission {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub ip_ranges: Vec<IpRange>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    pub cidr_ip: String,
    pub description: String,
}

impl From<&IngressRule> for IpPermission {
    fn from(rule: &IngressRule) -> Self {
        IpPermission {
            ip_protocol: rule.protocol.clone(),
            from_port: rule.port,
            to_port: rule.port,
            ip_ranges: vec![IpRange {
                cidr_ip: rule.address.clone(),
                description: rule.description.clone(),
            }],
        }
    }
}

/// Group ids from a `DescribeSecurityGroups` document, in response order.
pub fn group_ids(description: &Value) -> Vec<String> {
    description["SecurityGroups"]
        .as_array()
        .map(|sgs| {
            sgs.iter()
                .filter_map(|sg| sg["GroupId"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Drives EC2 through the `aws` command-line client.
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    region: String,
}

impl AwsCli {
    /// An empty `region` leaves region selection to the client's own config.
    pub fn new(program: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            region: region.into(),
        }
    }

    fn ec2_args(&self, operation: &str) -> Vec<String> {
        let mut args = vec!["ec2".to_string(), operation.to_string()];
        if !self.region.is_empty() {
            args.push("--region".to_string());
            args.push(self.region.clone());
        }
        args.extend(["--output", "json", "--no-cli-pager"].map(String::from));
        args
    }

    fn run(&self, args: &[String]) -> Result<Vec<u8>, ServiceError> {
        log::debug!("running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .env("AWS_PAGER", "")
            .output()
            .map_err(|source| ServiceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        log::trace!("{} failed with {}: {}", self.program, output.status, stderr.trim());
        Err(parse_error(&stderr).unwrap_or_else(|| ServiceError::Failed {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        }))
    }
}

impl SecurityGroupService for AwsCli {
    fn describe_security_groups(&self, group_ids: &[String]) -> Result<Value, ServiceError> {
        let mut args = self.ec2_args("describe-security-groups");
        if !group_ids.is_empty() {
            args.push("--group-ids".to_string());
            args.extend(group_ids.iter().cloned());
        }

        let stdout = self.run(&args)?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<(), ServiceError> {
        let permissions = serde_json::to_string(&[IpPermission::from(rule)])?;

        let mut args = self.ec2_args("authorize-security-group-ingress");
        args.extend([
            "--group-id".to_string(),
            group_id.to_string(),
            "--ip-permissions".to_string(),
            permissions,
        ]);

        self.run(&args).map(|_| ())
    }
}

fn error_regex() -> &'static Regex {
    static ERROR_REGEX: OnceLock<Regex> = OnceLock::new();
    ERROR_REGEX.get_or_init(|| {
        Regex::new(r"An error occurred \(([^)]+)\) when calling the \S+ operation(?: \([^)]*\))?: (.*)")
            .expect("Invalid Regex")
    })
}

/// Recover the EC2 error code and message from the client's stderr.
fn parse_error(stderr: &str) -> Option<ServiceError> {
    let caps = error_regex().captures(stderr)?;
    Some(ServiceError::Api {
        code: caps[1].to_string(),
        message: caps[2].trim().to_string(),
    })
}
