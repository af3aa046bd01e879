use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use repo_brief::{
    AnalysisRequest, Analyzer, AnalyzerConfig, CommandCompletion, DEFAULT_MAX_FILE_BYTES,
    extract_dockerfile, extract_json, load_snapshot, plan_context,
};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "repo-brief",
    version,
    author,
    about = "Select and budget repository files for LLM analysis",
    long_about = "Select the files that best explain a repository, fit them into a token \
    budget, and drive an external completion command through codebase analysis, tool \
    generation, Dockerfile, documentation and server-template stages.\n\n\
    JSON goes to stdout; logs go to stderr.\n\n\
    USAGE EXAMPLES:\n  \
      # Tree, key files and truncated context for a project\n  \
      repo-brief scan ./my-project\n\n  \
      # Recover JSON from a completion\n  \
      echo 'Sure! {\"a\": 1}' | repo-brief extract json\n\n  \
      # Full analysis through a completion command\n  \
      repo-brief analyze --dir ./my-project --command ./complete.sh"
)]
struct Cli {
    /// Verbose output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tree, key files and truncated context of a directory
    Scan {
        /// Root directory to scan
        #[arg(default_value = ".", value_name = "PATH")]
        dir: PathBuf,

        #[command(flatten)]
        budget: BudgetArgs,
    },

    /// Run an extractor over stdin and print the tagged outcome
    Extract {
        /// Payload to recover
        #[arg(value_enum)]
        kind: ExtractKind,
    },

    /// Run the full pipeline through a completion command
    Analyze {
        /// Load the snapshot from a directory instead of reading a request from stdin
        #[arg(short, long, value_name = "PATH")]
        dir: Option<PathBuf>,

        /// Command that reads a completion request on stdin and prints the completion
        #[arg(long, env = "REPO_BRIEF_COMMAND", value_name = "PROGRAM")]
        command: PathBuf,

        /// Argument passed to the completion command (can be used multiple times)
        #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Per-completion timeout in seconds
        #[arg(long, env = "REPO_BRIEF_TIMEOUT", default_value_t = 120)]
        timeout: u64,

        /// Model identifier forwarded to the completion command
        #[arg(long, env = "REPO_BRIEF_MODEL")]
        model: Option<String>,

        /// Ask the completion command to pick key files first
        #[arg(long)]
        llm_select: bool,

        #[command(flatten)]
        budget: BudgetArgs,
    },

    /// Report that the binary is usable
    HealthCheck,
}

#[derive(Args, Debug)]
struct BudgetArgs {
    /// Maximum number of key files
    #[arg(long, env = "REPO_BRIEF_MAX_KEY_FILES", default_value_t = repo_brief::DEFAULT_MAX_KEY_FILES)]
    max_key_files: usize,

    /// Token budget for the truncated context
    #[arg(long, env = "REPO_BRIEF_TOKEN_BUDGET", default_value_t = repo_brief::DEFAULT_TOKEN_BUDGET)]
    token_budget: usize,

    /// Characters per estimated token
    #[arg(long, env = "REPO_BRIEF_CHARS_PER_TOKEN", default_value_t = repo_brief::DEFAULT_CHARS_PER_TOKEN)]
    chars_per_token: usize,

    /// Skip files larger than this many bytes when loading a directory
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_BYTES)]
    max_file_bytes: u64,

    /// Extra glob pattern to exclude (can be used multiple times)
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
}

impl BudgetArgs {
    fn config(&self, model: Option<String>, llm_select: bool) -> anyhow::Result<AnalyzerConfig> {
        let mut builder = AnalyzerConfig::builder()
            .max_key_files(self.max_key_files)
            .token_budget(self.token_budget)
            .chars_per_token(self.chars_per_token)
            .llm_file_selection(llm_select)
            .extra_ignore_patterns(self.exclude.iter().cloned());

        if let Some(model) = model {
            builder = builder.model(model);
        }

        builder.build().context("Failed to build configuration")
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExtractKind {
    Json,
    Dockerfile,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    match cli.command {
        Command::Scan { dir, budget } => {
            let config = budget.config(None, false)?;
            let filter = config.ignore_filter()?;
            let snapshot = load_snapshot(&dir, &filter, budget.max_file_bytes)
                .with_context(|| format!("Failed to load {}", dir.display()))?;
            let plan = plan_context(&snapshot, &config)?;
            print_json(&plan)?;
        }
        Command::Extract { kind } => {
            let input = read_stdin()?;
            match kind {
                ExtractKind::Json => {
                    let extraction = extract_json(&input).context("Nothing to extract")?;
                    print_json(&extraction)?;
                }
                ExtractKind::Dockerfile => print_json(&extract_dockerfile(&input))?,
            }
        }
        Command::Analyze {
            dir,
            command,
            args,
            timeout,
            model,
            llm_select,
            budget,
        } => {
            let config = budget.config(model, llm_select)?;

            let request = match dir {
                Some(dir) => {
                    let snapshot = load_snapshot(&dir, &config.ignore_filter()?, budget.max_file_bytes)
                        .with_context(|| format!("Failed to load {}", dir.display()))?;
                    AnalysisRequest {
                        project_name: dir
                            .canonicalize()
                            .ok()
                            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned())),
                        ..AnalysisRequest::new(snapshot)
                    }
                }
                None => serde_json::from_str(&read_stdin()?)
                    .context("Failed to parse analysis request from stdin")?,
            };

            let completion = CommandCompletion::new(command)
                .args(args)
                .timeout(Duration::from_secs(timeout));
            let analyzer = Analyzer::new(config, Arc::new(completion))
                .context("Failed to create analyzer")?;

            let response = analyzer.respond(request).await;
            print_json(&response)?;
            if !response.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::HealthCheck => print_json(&Health {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
        })?,
    }

    Ok(ExitCode::SUCCESS)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    Ok(input)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("repo_brief=warn"),
        1 => EnvFilter::new("repo_brief=info"),
        2 => EnvFilter::new("repo_brief=debug"),
        _ => EnvFilter::new("repo_brief=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
