use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, LogFormat};
use gatekeeper::error::GatekeeperError;
use gatekeeper::ratelimit::{ConfigRuleService, RateLimiter, Rule, RuleTable};

/// Request admission checks against per-API rate limit rules.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Cli {
    /// YAML file with logging settings and rate limit rules
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (overrides the configuration file)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run admission checks for one API and caller
    Check {
        #[arg(long)]
        api: String,
        #[arg(long)]
        caller: String,
        /// Number of consecutive checks
        #[arg(long, default_value_t = 1)]
        times: u32,
        /// Print verdicts as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Read `api caller` pairs, one per line, and print a verdict for each
    Replay {
        /// Input file, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,
        /// Print verdicts as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct Verdict<'a> {
    api: &'a str,
    caller: &'a str,
    allowed: bool,
}

/// Exit status for configuration failures, including APIs without a rule.
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Map a failure to the process exit status.
fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<GatekeeperError>() {
        Some(e) if e.is_configuration() => EXIT_CONFIG,
        _ => 1,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => GatekeeperConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GatekeeperConfig {
            rules: RuleTable::new().with_default(Rule::default()),
            ..GatekeeperConfig::default()
        },
    };

    init_tracing(&config, cli.log_format);

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        apis = config.rules.apis.len(),
        has_default = config.rules.default_rule.is_some(),
        "Rules loaded"
    );

    let limiter = RateLimiter::new(ConfigRuleService::new(config.rules));
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Check {
            api,
            caller,
            times,
            json,
        } => {
            for _ in 0..times {
                let allowed = limiter.is_allowed(&api, &caller)?;
                print_verdict(&mut out, &api, &caller, allowed, json)?;
            }
        }
        Command::Replay { input, json } => {
            let reader: Box<dyn BufRead> = if input == "-" {
                Box::new(BufReader::new(io::stdin()))
            } else {
                let file = std::fs::File::open(&input)
                    .with_context(|| format!("failed to open {}", input))?;
                Box::new(BufReader::new(file))
            };

            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                let mut fields = line.split_whitespace();
                let (Some(api), Some(caller), None) = (fields.next(), fields.next(), fields.next())
                else {
                    warn!(line = number + 1, "Skipping malformed line, expected `api caller`");
                    continue;
                };

                let allowed = limiter.is_allowed(api, caller)?;
                print_verdict(&mut out, api, caller, allowed, json)?;
            }
        }
    }

    info!(tracked_keys = limiter.tracked_keys(), "Gatekeeper finished");
    Ok(())
}

fn init_tracing(config: &GatekeeperConfig, format_override: Option<LogFormat>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(io::stderr);

    match format_override.unwrap_or(config.logging.format) {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_verdict(
    out: &mut impl Write,
    api: &str,
    caller: &str,
    allowed: bool,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let verdict = Verdict {
            api,
            caller,
            allowed,
        };
        serde_json::to_writer(&mut *out, &verdict)?;
        writeln!(out)?;
    } else {
        let outcome = if allowed { "allowed" } else { "denied" };
        writeln!(out, "{} {} {}", api, caller, outcome)?;
    }
    Ok(())
}
