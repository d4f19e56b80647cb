use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{debug, info};

use ssh_enabler::config::{self, SessionSettings, Settings};
use ssh_enabler::credentials::Credentials;
use ssh_enabler::dispatcher::Dispatcher;
use ssh_enabler::failure_log::FailureLog;
use ssh_enabler::inventory::{self, DeviceTarget};
use ssh_enabler::logging;
use ssh_enabler::prompt::{Mode, Prompter};
use ssh_enabler::remediator::{RemediationOptions, Remediator};
use ssh_enabler::report::{self, RunReport, Summary};
use ssh_enabler::session::TelnetConnector;

/// Environment variable that supplies the login secret for unattended runs.
const SECRET_ENV: &str = "SSH_ENABLER_SECRET";

/// Enable SSH version 2 on Cisco IOS devices reachable over telnet.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Device inventory CSV (device_type,IP_Address,HostName)
    #[arg(long, default_value = config::DEFAULT_INVENTORY)]
    inventory: PathBuf,

    /// Append-only log of failed devices
    #[arg(long, default_value = config::DEFAULT_FAILURE_LOG)]
    log_file: PathBuf,

    /// Remediate one device or all inventory devices (one/all)
    #[arg(long)]
    mode: Option<Mode>,

    /// Target address in `one` mode
    #[arg(long)]
    ip: Option<String>,

    /// Login username
    #[arg(short, long)]
    username: Option<String>,

    /// Telnet port
    #[arg(long, default_value_t = config::DEFAULT_TELNET_PORT)]
    port: u16,

    /// Maximum number of devices remediated at the same time
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Seconds allowed for connecting and logging in
    #[arg(long, default_value_t = config::DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout: u64,

    /// Seconds allowed per command
    #[arg(long, default_value_t = config::DEFAULT_COMMAND_TIMEOUT_SECS)]
    command_timeout: u64,

    /// Seconds allowed for RSA key generation
    #[arg(long, default_value_t = config::DEFAULT_KEYGEN_TIMEOUT_SECS)]
    keygen_timeout: u64,

    /// Try an SSH login after each successful remediation
    #[arg(long)]
    probe_ssh: bool,

    /// Write a JSON report of all outcomes to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the JSON schema of the report and exit
    #[arg(long)]
    report_schema: bool,

    /// More diagnostics on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            inventory: self.inventory.clone(),
            failure_log: self.log_file.clone(),
            concurrency: self.concurrency,
            session: SessionSettings {
                telnet_port: self.port,
                connect_timeout: Duration::from_secs(self.connect_timeout),
                command_timeout: Duration::from_secs(self.command_timeout),
                keygen_timeout: Duration::from_secs(self.keygen_timeout),
                ..SessionSettings::default()
            },
            probe_ssh: self.probe_ssh,
        }
    }
}

/// Answers gathered before any device is contacted.
struct RunInput {
    credentials: Credentials,
    mode: Mode,
    ip: Option<String>,
}

fn gather_input(args: &Args) -> Result<RunInput> {
    let mut prompter = Prompter::stdio();
    println!("login creds needed!\n");

    let username = match &args.username {
        Some(username) => username.clone(),
        None => prompter.ask_non_empty("Username: ")?,
    };
    let secret = match std::env::var(SECRET_ENV) {
        Ok(secret) if !secret.is_empty() => secret,
        _ => prompter.ask_secret("Password: ")?,
    };
    let credentials = Credentials::new(username, secret);

    println!("{}", report::startup_banner());

    let mode = match args.mode {
        Some(mode) => mode,
        None => prompter.ask_mode()?,
    };
    let ip = match (mode, &args.ip) {
        (Mode::One, Some(ip)) => Some(ip.trim().to_string()),
        (Mode::One, None) => Some(prompter.ask_non_empty("Please enter the target IP address: ")?),
        (Mode::All, _) => None,
    };
    Ok(RunInput {
        credentials,
        mode,
        ip,
    })
}

/// Uses the inventory host name for a single address when the inventory lists it.
fn single_target(settings: &Settings, ip: &str) -> DeviceTarget {
    match inventory::load(&settings.inventory) {
        Ok(records) => inventory::supported_targets(&records)
            .into_iter()
            .find(|target| target.address == ip)
            .unwrap_or_else(|| DeviceTarget::from_address(ip)),
        Err(err) => {
            debug!("no host name lookup for {}: {}", ip, err);
            DeviceTarget::from_address(ip)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    if args.report_schema {
        println!("{}", report::report_schema()?);
        return Ok(());
    }

    println!("Welcome to the SSH enable script for Cisco Devices\n");
    let settings = args.settings();
    let input = gather_input(&args)?;

    let failure_log = FailureLog::open(&settings.failure_log).with_context(|| {
        format!(
            "failed to open failure log {}",
            settings.failure_log.display()
        )
    })?;

    let targets = match (input.mode, input.ip.as_deref()) {
        (Mode::One, Some(ip)) => vec![single_target(&settings, ip)],
        _ => {
            let records = inventory::load(&settings.inventory)?;
            let targets = inventory::supported_targets(&records);
            info!(
                "{} of {} inventory rows are supported devices",
                targets.len(),
                records.len()
            );
            println!("All devices will be changed.\n\n");
            targets
        }
    };

    let options = RemediationOptions {
        probe_ssh: settings.probe_ssh,
        inventory_label: settings.inventory.display().to_string(),
        ..RemediationOptions::from_session(&settings.session)
    };
    let remediator = Remediator::new(
        Arc::new(TelnetConnector::new(settings.session)),
        Arc::new(input.credentials),
        Arc::new(failure_log),
        options,
    );
    let dispatcher = Dispatcher::new(remediator, settings.concurrency);

    let started_at = Local::now();
    let started = Instant::now();
    let outcomes = match input.mode {
        Mode::One => {
            let mut outcomes = Vec::with_capacity(targets.len());
            for target in targets {
                let outcome = dispatcher.remediate_one(target).await;
                println!("{}", outcome.transcript);
                outcomes.push(outcome);
            }
            outcomes
        }
        Mode::All => {
            dispatcher
                .remediate_all(targets, |outcome| println!("{}", outcome.transcript))
                .await
        }
    };
    let elapsed = started.elapsed();

    let summary = Summary::from_outcomes(&outcomes);
    println!(
        "{}",
        report::render_summary(&summary, &settings.failure_log, elapsed)
    );

    if let Some(path) = &args.report {
        let json = RunReport::new(started_at, elapsed, outcomes).to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    Ok(())
}
