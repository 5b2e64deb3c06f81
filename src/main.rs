use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use sgkit::aws::DEFAULT_AWS_CLI;
use sgkit::commands::{self, Action};
use sgkit::rules::{self, RuleFormat, RulesSource, DEFAULT_PROTOCOL};
use sgkit::{AwsCli, RegionConfig};

#[derive(Parser)]
#[command(name = "sgkit")]
#[command(about = "List EC2 security groups or add ingress rules from a file", long_about = None)]
struct Cli {
    /// What to do with the security groups
    #[arg(long, value_enum, default_value_t = Action::List)]
    action: Action,

    /// Region key in the configuration file (e.g. pdx, iad, dub, sfo)
    #[arg(long, default_value = "pdx")]
    region: String,

    /// Comma-separated security group ids; defaults to the region's group
    #[arg(long)]
    sg: Option<String>,

    /// Rules file
    #[arg(long, default_value = "ips.txt")]
    file: PathBuf,

    /// Comma-separated ports applied to every line of a delimited rules file
    #[arg(long, default_value = "22")]
    ports: String,

    /// Protocol applied to every line of a delimited rules file
    #[arg(long, default_value = DEFAULT_PROTOCOL)]
    protocol: String,

    /// Rules file format
    #[arg(long, value_enum, default_value_t = RuleFormat::Auto)]
    format: RuleFormat,

    /// AWS configuration in JSON format
    #[arg(long, default_value = "awsconfig.json")]
    conf: PathBuf,

    /// AWS command-line client to run
    #[arg(long, env = "SGKIT_AWS_CLI", default_value = DEFAULT_AWS_CLI)]
    aws_cli: String,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = RegionConfig::load(&cli.conf).context("Unable to read AWS configuration")?;
    let profile = config.profile(&cli.region);
    log::info!(
        "region {} -> {:?} (default group {:?}, vpc {:?})",
        cli.region,
        profile.region_code,
        profile.security_group_id,
        profile.vpc_id
    );

    let group_ids = commands::resolve_group_ids(cli.sg.as_deref(), &profile);
    let service = AwsCli::new(cli.aws_cli, profile.region_code);

    match cli.action {
        Action::List => {
            commands::list(&service, &group_ids, &mut io::stdout())?;
        }

        Action::Add => {
            let source = RulesSource {
                ports: rules::parse_ports(&cli.ports)?,
                path: cli.file,
                format: cli.format,
                protocol: cli.protocol,
            };
            commands::add(
                &service,
                &group_ids,
                &source,
                &mut io::stdout(),
                &mut io::stderr(),
                io::stderr().is_terminal(),
            )?;
        }
    }

    Ok(())
}
