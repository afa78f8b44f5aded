use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use test_reaper::process::ProtectedPids;
use test_reaper::wrapper::{self, run_wrapped, TrapHandlers, WrapOptions};
use test_reaper::{Config, Settings, Supervisor};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "test-reaper")]
#[command(about = "Terminate stray test processes, or run a test command and clean up after it")]
struct Args {
    /// Config file (default: search the usual locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grace window between the graceful and the forceful signal, in milliseconds
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Report matching processes without signaling them
    #[arg(long)]
    dry_run: bool,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// In wrapper mode, also clean up after the command exits normally
    #[arg(long)]
    sweep_on_exit: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Command to run under supervision
    #[arg(last = true)]
    command: Vec<String>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(args: &Args) -> Settings {
    let config = Config::load(args.config.as_deref());
    let mut settings = config.settings().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid config, using defaults");
        Settings::default()
    });
    if let Some(ms) = args.grace_ms {
        settings.policy.grace_window = Duration::from_millis(ms);
    }
    settings
}

fn exit_status(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = load_settings(&args);
    let mut supervisor = Supervisor::system(settings).dry_run(args.dry_run);

    if args.command.is_empty() {
        let (cascade, audit) = supervisor
            .run(&ProtectedPids::for_caller())
            .await
            .context("cleanup aborted")?;

        if args.json {
            let out = serde_json::json!({ "cascade": cascade, "audit": audit });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            print!("{cascade}{audit}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Handlers go in before the child exists so no signal slips through
    let mut handlers = TrapHandlers::install();
    let options = WrapOptions {
        sweep_on_exit: args.sweep_on_exit,
    };

    match run_wrapped(&mut supervisor, &args.command, &mut handlers, options).await {
        Ok(outcome) => {
            // Child owns stdout, status lines go to stderr
            if let Some(cascade) = &outcome.cascade {
                if args.json {
                    eprintln!("{}", serde_json::to_string_pretty(cascade)?);
                } else {
                    eprint!("{cascade}");
                    eprintln!("cleanup completed");
                }
            }
            Ok(exit_status(outcome.exit_code))
        }
        Err(e) if e.is_fatal() => Err(e).context("cleanup aborted"),
        Err(e) => {
            tracing::error!(error = %e, "could not start command");
            eprintln!("test-reaper: {e}");
            Ok(exit_status(wrapper::spawn_failure_code(&e)))
        }
    }
}
