mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use myco_lib::ops::{Operation, OpsError};
use myco_lib::pipeline::SecretRef;
use myco_lib::platform::Platform;

use crate::cmd::{Session, cmd_ci, cmd_info, cmd_plan, cmd_run};
use crate::output::{OutputFormat, print_diagnostics, print_error};

/// myco - Build orchestration for the Mycelium monorepo
#[derive(Parser)]
#[command(name = "myco")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the config file (default: MYCO_CONFIG, then myco.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Root of the monorepo checkout (default: current directory)
  #[arg(long, global = true)]
  source: Option<PathBuf>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  #[command(flatten)]
  Op(OpCommand),

  /// Describe the pipelines a command would run, without running them
  Plan {
    #[command(subcommand)]
    command: OpCommand,
  },

  /// Display configuration and platform information
  Info,
}

#[derive(Subcommand, Clone)]
enum OpCommand {
  /// Compile the backend
  BuildBackend,

  /// Run the backend test suite
  TestBackend,

  /// Build the desktop app bundle
  BuildApp {
    /// Cross-compile the bundle for this platform
    #[arg(long)]
    platform: Option<Platform>,
  },

  /// Build the central daemon
  BuildCentral {
    /// Target platform (default: the engine's native platform)
    #[arg(long)]
    arch: Option<Platform>,
  },

  /// Run the central daemon test suite
  TestCentral {
    /// Target platform (default: the engine's native platform)
    #[arg(long)]
    arch: Option<Platform>,
  },

  /// Build the peripheral firmware
  BuildPeripheral {
    /// Platform of the build container
    #[arg(long, default_value = "linux/amd64")]
    arch: Platform,
  },

  /// Build the backend for every platform and publish one multi-arch image
  PublishBackend {
    /// Registry credential reference (env:NAME or file:PATH)
    #[arg(long)]
    credential: SecretRef,

    /// Image tag (default: latest)
    #[arg(long)]
    tag: Option<String>,

    /// Platform to include; repeat for several (default: from config)
    #[arg(long = "platform")]
    platforms: Vec<Platform>,
  },

  /// Generate an API client from the backend's OpenAPI document
  CreateClient {
    /// OpenAPI generator name (e.g. typescript-fetch)
    #[arg(long)]
    generator: String,

    /// Package name of the generated client
    #[arg(long)]
    package_name: String,

    /// Directory the client is written to
    #[arg(long, default_value = "client")]
    out: PathBuf,
  },

  /// Run every configured component pipeline concurrently
  Ci {
    /// Firmware target platform
    #[arg(long)]
    arch: Option<Platform>,

    /// Abort the run after this long (e.g. "30m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
  },
}

impl OpCommand {
  fn into_operation(self) -> Operation {
    match self {
      Self::BuildBackend => Operation::BuildBackend,
      Self::TestBackend => Operation::TestBackend,
      Self::BuildApp { platform } => Operation::BuildApp { platform },
      Self::BuildCentral { arch } => Operation::BuildCentral { platform: arch },
      Self::TestCentral { arch } => Operation::TestCentral { platform: arch },
      Self::BuildPeripheral { arch } => Operation::BuildPeripheral { platform: arch },
      Self::PublishBackend {
        credential,
        tag,
        platforms,
      } => Operation::PublishBackend {
        credential,
        tag,
        platforms: (!platforms.is_empty()).then_some(platforms),
      },
      Self::CreateClient {
        generator,
        package_name,
        out,
      } => Operation::CreateClient {
        generator,
        package_name,
        out,
      },
      Self::Ci { arch, timeout } => Operation::Ci { platform: arch, timeout },
    }
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
  let format = cli.output;
  let session = Session::load(cli.config.as_deref(), cli.source.as_deref())?;

  match cli.command {
    Commands::Info => cmd_info(&session, format),
    Commands::Plan { command } => cmd_plan(&session, command.into_operation(), cli.verbose, format),
    Commands::Op(command @ OpCommand::Ci { .. }) => cmd_ci(&session, command.into_operation(), format),
    Commands::Op(command) => cmd_run(&session, command.into_operation(), format),
  }
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    if let Some(output) = e
      .chain()
      .find_map(|cause| cause.downcast_ref::<OpsError>())
      .and_then(OpsError::diagnostics)
    {
      print_diagnostics(output);
    }
    std::process::exit(1);
  }
}
