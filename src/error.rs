use std::path::PathBuf;

use thiserror::Error;

use crate::aws::ServiceError;

#[derive(Error, Debug)]
pub enum SgError {
    #[error("unable to read file: {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse json: {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("parse IP address error: unable to read {}", .path.display())]
    RulesRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse IP address error: {}{}: {reason}", .path.display(), line_suffix(.line))]
    RulesParse {
        path: PathBuf,
        /// 1-based line number, when the format has lines
        line: Option<usize>,
        reason: String,
    },

    #[error("parsing port error: {value:?} is not a port between 1 and 65535")]
    InvalidPort { value: String },

    #[error("{0}")]
    RemoteLookup(String),

    #[error("Unable to set security group {group_id} ingress for {address} ({description}), {error}")]
    RemoteMutation {
        group_id: String,
        address: String,
        description: String,
        error: ServiceError,
    },

    #[error("unable to write output: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SgError>;

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(":{l}")).unwrap_or_default()
}
