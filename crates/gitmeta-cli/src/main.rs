use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gitmeta_core::{
    CommandHook, CommitLogOption, GenerateOutcome, GitMeta, GitOutput, GitRunner, HookRegistry,
    Settings, SettingsStore,
};

mod local_config;

use local_config::LocalConfig;

#[derive(Debug, Parser)]
#[command(name = "gitmeta")]
#[command(about = "Print branch name, commit hash and commit log of a git repository", long_about = None)]
struct Cli {
    /// Repository to query (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,
    /// git executable to run instead of the configured one
    #[arg(long, global = true)]
    git: Option<String>,
    /// Kill git and fail when a query takes longer than this
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(flatten)]
    Query(QueryCommand),
    Config(ConfigCmd),
}

/// Subcommands that read from a repository.
#[derive(Debug, Subcommand)]
enum QueryCommand {
    Branch,
    Hash,
    ShortHash,
    Log(LogCmd),
    Info(InfoCmd),
    Generate,
}

#[derive(Debug, Args)]
struct LogCmd {
    /// Maximum number of commits, 0 for no limit
    #[arg(long)]
    count: Option<usize>,
    /// Leave merge commits out
    #[arg(long, overrides_with = "merges")]
    no_merges: bool,
    /// Keep merge commits even when the configuration leaves them out
    #[arg(long, overrides_with = "no_merges")]
    merges: bool,
    /// git pretty-format string, e.g. "%h %s"
    #[arg(long)]
    format: Option<String>,
}

impl LogCmd {
    fn no_merges(&self) -> Option<bool> {
        match (self.no_merges, self.merges) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
struct InfoCmd {
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    Show,
    SetGitBinary { binary: String },
    SetTimeout { ms: u64 },
    SetGenerateCommand { command: String },
    ClearGenerateCommand,
}

#[derive(Debug, Args)]
struct ConfigCmd {
    #[command(subcommand)]
    subcommand: ConfigSubcommand,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let store = SettingsStore::default_store().context("failed to resolve settings path")?;
    let settings = store.load().context("failed to load settings")?;

    match cli.command {
        Commands::Config(cmd) => run_config(cmd.subcommand, &store, settings),
        Commands::Query(query) => run_query(query, &settings, cli.repo, cli.git, cli.timeout_ms),
    }
}

fn run_query(
    command: QueryCommand,
    settings: &Settings,
    repo: Option<PathBuf>,
    git: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let repo = resolve_repo(repo)?;
    let runner = build_runner(settings, git, timeout_ms);
    log::debug!(
        "repo={} git={} timeout={:?}",
        repo.display(),
        runner.git_binary(),
        runner.timeout()
    );
    let local = LocalConfig::load(&repo)?;
    let meta = GitMeta::new(runner.clone(), repo.clone());

    match command {
        QueryCommand::Branch => {
            let branch = meta
                .load_branch_name()
                .with_context(|| format!("failed to read branch name in {}", repo.display()))?;
            println!("{branch}");
        }
        QueryCommand::Hash => {
            let hash = meta
                .load_commit_hash()
                .with_context(|| format!("failed to read commit hash in {}", repo.display()))?;
            println!("{hash}");
        }
        QueryCommand::ShortHash => {
            let hash = meta.load_short_commit_hash().with_context(|| {
                format!("failed to read short commit hash in {}", repo.display())
            })?;
            println!("{hash}");
        }
        QueryCommand::Log(cmd) => {
            let no_merges = cmd.no_merges();
            let option = build_log_option(
                local.apply_log(settings.commit_log.clone()),
                cmd.count,
                no_merges,
                cmd.format,
            );
            if let Ok(args) = option.to_args() {
                log::debug!("running {}", GitOutput::command_line(runner.git_binary(), &args));
            }
            let log = meta
                .load_commit_log(&option)
                .with_context(|| format!("failed to read commit log in {}", repo.display()))?;
            println!("{log}");
        }
        QueryCommand::Info(cmd) => {
            let option = local.apply_log(settings.commit_log.clone());
            let snapshot = meta
                .snapshot(&option)
                .with_context(|| format!("failed to collect git info in {}", repo.display()))?;
            let json = if cmd.pretty {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                serde_json::to_string(&snapshot)?
            };
            println!("{json}");
        }
        QueryCommand::Generate => {
            let registry = build_registry(&local, settings, &runner)?;
            let option = local.apply_log(settings.commit_log.clone());
            let snapshot = meta
                .snapshot(&option)
                .with_context(|| format!("failed to collect git info in {}", repo.display()))?;
            match registry.trigger(&snapshot)? {
                GenerateOutcome::NoHandlerRegistered => {
                    log::warn!(
                        "no generate command registered (use `gitmeta config set-generate-command` or `generate_command` in {})",
                        local_config::LOCAL_CONFIG_FILE
                    );
                }
                GenerateOutcome::Ran { hooks } => {
                    for run in hooks {
                        let stdout = run.output.stdout.trim_end();
                        if !stdout.is_empty() {
                            println!("{stdout}");
                        }
                        let stderr = run.output.stderr.trim_end();
                        if !stderr.is_empty() {
                            eprintln!("{stderr}");
                        }
                        eprintln!("generated: {}", run.name);
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_config(cmd: ConfigSubcommand, store: &SettingsStore, settings: Settings) -> Result<()> {
    let change: Box<dyn FnOnce(&mut Settings)> = match cmd {
        ConfigSubcommand::Show => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        ConfigSubcommand::SetGitBinary { binary } => {
            Box::new(move |settings: &mut Settings| settings.git_binary = Some(binary))
        }
        ConfigSubcommand::SetTimeout { ms } => {
            Box::new(move |settings: &mut Settings| settings.timeout_ms = Some(ms))
        }
        ConfigSubcommand::SetGenerateCommand { command } => {
            CommandHook::parse(&command).context("invalid generate command")?;
            Box::new(move |settings: &mut Settings| settings.generate_command = Some(command))
        }
        ConfigSubcommand::ClearGenerateCommand => {
            Box::new(|settings: &mut Settings| settings.generate_command = None)
        }
    };
    store.update(change).context("failed to save settings")?;
    println!("settings updated: {}", store.path().display());
    Ok(())
}

fn resolve_repo(cli_repo: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(repo) = cli_repo {
        return Ok(repo);
    }
    std::env::current_dir().context("failed to resolve current directory")
}

fn build_runner(settings: &Settings, git: Option<String>, timeout_ms: Option<u64>) -> GitRunner {
    let binary = git
        .or_else(|| settings.git_binary.clone())
        .unwrap_or_else(|| "git".to_string());
    let timeout = match timeout_ms {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => settings.timeout(),
    };
    let runner = GitRunner::new(binary);
    match timeout {
        Some(timeout) => runner.with_timeout(timeout),
        None => runner,
    }
}

fn build_log_option(
    mut base: CommitLogOption,
    count: Option<usize>,
    no_merges: Option<bool>,
    format: Option<String>,
) -> CommitLogOption {
    if let Some(count) = count {
        base.count = count;
    }
    if let Some(no_merges) = no_merges {
        base.no_merges = no_merges;
    }
    if let Some(format) = format {
        base.format = format;
    }
    base
}

fn build_registry(
    local: &LocalConfig,
    settings: &Settings,
    runner: &GitRunner,
) -> Result<HookRegistry> {
    let mut registry = HookRegistry::new();
    let command = local
        .generate_command
        .clone()
        .or_else(|| settings.generate_command.clone());
    if let Some(command) = command {
        let hook = CommandHook::parse(&command)
            .context("invalid generate command")?
            .with_timeout(runner.timeout());
        registry.register(Box::new(hook));
    }
    Ok(registry)
}
