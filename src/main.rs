use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mdexec::config::DEFAULT_CONFIG_FILE;
use mdexec::{
    load_languages, reporting, ApprovalStore, CapabilityTable, ExecOptions, FileConfig, Mode,
    Runner,
};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;

/// Run the code examples embedded in Markdown documents.
#[derive(Debug, Parser)]
#[command(version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Approve a config file so the commands it defines may run
    Allow {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Revoke the approval of a config file
    Deny {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// List approved config files
    List,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Markdown documents to check, in order
    sources: Vec<PathBuf>,

    /// Expected number of examples (0 disables the check)
    #[arg(short = 'c', long)]
    count: Option<usize>,

    /// Language catalog (Linguist languages.yml)
    #[arg(long, value_name = "FILE")]
    languages: Option<PathBuf>,

    /// Do not download the language catalog when it is missing
    #[arg(long)]
    no_auto_pull: bool,

    /// Write every example under DIR instead of running it
    #[arg(long, value_name = "DIR")]
    extract: Option<PathBuf>,

    /// Per-example timeout in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Report examples whose interpreter is not installed as skipped
    #[arg(long)]
    skip_missing: bool,

    /// Config file (defaults to ./mdexec.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug details
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

pub fn main() {
    let cli = Cli::parse();
    init_logging(&cli.run);

    let result = match cli.command {
        Some(Command::Allow { config }) => allow(&config),
        Some(Command::Deny { config }) => deny(&config),
        Some(Command::List) => list(),
        None => run(cli.run),
    };

    match result {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit(1);
        }
    }
}

fn init_logging(args: &RunArgs) {
    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

fn allow(config: &Path) -> Result<bool> {
    ApprovalStore::from_env()?.approve(config)?;
    println!("Approved {}", config.display());
    Ok(true)
}

fn deny(config: &Path) -> Result<bool> {
    ApprovalStore::from_env()?.deny(config)?;
    println!("Denied {}", config.display());
    Ok(true)
}

fn list() -> Result<bool> {
    let approved = ApprovalStore::from_env()?.list()?;
    if approved.is_empty() {
        println!("No approved config files");
    }
    for path in approved {
        println!("{}", path);
    }
    Ok(true)
}

/// Loads the config file named on the command line, or `mdexec.toml` from the
/// working directory if there is one.
fn load_config(path: Option<&Path>) -> Result<Option<(PathBuf, FileConfig)>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(None);
            }
            default
        }
    };

    log::debug!("loading config={}", path.display());
    let config = FileConfig::load(&path)?;
    Ok(Some((path, config)))
}

/// Returns whether every example passed.
fn run(args: RunArgs) -> Result<bool> {
    let (config_path, config) = match load_config(args.config.as_deref())? {
        Some((path, config)) => (Some(path), config),
        None => (None, FileConfig::default()),
    };

    if let Some(ref path) = config_path {
        if config.defines_commands() {
            let store = ApprovalStore::from_env()?;
            if let Err(e) = store.ensure_approved(path) {
                reporting::report_unapproved(path);
                return Err(e);
            }
        }
    }

    let capabilities = CapabilityTable::from_config(&config)?;
    log::debug!("capabilities {:?}", capabilities);

    // The catalog may need a blocking download, which has to happen outside
    // the async runtime.
    let languages_path = args
        .languages
        .or_else(|| config.languages_file.as_ref().map(PathBuf::from));
    let languages = load_languages(languages_path.as_deref(), !args.no_auto_pull)?;

    let mode = match args.extract {
        Some(dir) => Mode::Extract(dir),
        None => Mode::Execute(ExecOptions {
            timeout: args
                .timeout
                .or(config.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(mdexec::capability::DEFAULT_TIMEOUT),
            skip_missing: args.skip_missing,
        }),
    };

    let runner = Runner::new(args.sources, capabilities)
        .with_expected_count(args.count.or(config.count).unwrap_or(0))
        .with_languages(languages)
        .with_mode(mode);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let errors = runtime.block_on(runner.run());

    reporting::report_errors(&errors);
    Ok(errors.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from([
            "mdexec", "-c", "4", "--extract", "out", "README.md", "docs/guide.md",
        ]);
        assert!(cli.command.is_none());
        assert_eq!(cli.run.count, Some(4));
        assert_eq!(cli.run.extract, Some(PathBuf::from("out")));
        assert_eq!(cli.run.sources.len(), 2);
    }

    #[test]
    fn test_subcommand() {
        let cli = Cli::parse_from(["mdexec", "allow", "--config", "docs/mdexec.toml"]);
        match cli.command {
            Some(Command::Allow { config }) => {
                assert_eq!(config, PathBuf::from("docs/mdexec.toml"))
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
