//! # repo-brief
//!
//! Picks the files of a repository that best explain it, fits them into a
//! token budget, and drives a text-completion collaborator through codebase
//! analysis, tool generation, Dockerfile, documentation and server-template
//! stages.
//!
//! ## Features
//!
//! - Language and role classification by path
//! - Ordered, auditable importance scoring
//! - Nested project tree with gitignore-style exclusions
//! - Token-budget truncation with head/tail cuts
//! - Best-effort JSON and Dockerfile recovery from free-form completions
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_brief::{AnalysisRequest, Analyzer, AnalyzerConfig, CommandCompletion, load_snapshot};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = AnalyzerConfig::builder()
//!     .token_budget(8_000)
//!     .max_key_files(15)
//!     .build()?;
//!
//! let snapshot = load_snapshot(Path::new("."), &config.ignore_filter()?, 1024 * 1024)?;
//! let analyzer = Analyzer::new(config, Arc::new(CommandCompletion::new("./complete.sh")))?;
//!
//! let response = analyzer.respond(AnalysisRequest::new(snapshot)).await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Tree**: nests the retained paths and counts languages
//! 2. **Select**: scores files and keeps the top few
//! 3. **Truncate**: admits files until the token budget runs out
//! 4. **Complete**: renders prompts and decodes what comes back

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod completion;
mod config;
mod error;
mod file;
mod filter;
mod pipeline;
mod prompt;
mod scanner;
mod select;
mod token;
mod tree;
mod truncate;

pub mod extract;
pub mod language;
pub mod score;
pub mod signals;

pub use completion::{CommandCompletion, CompletionRequest, Stage, TextCompletion};
pub use config::{
    AnalyzerConfig, AnalyzerConfigBuilder, DEFAULT_CONTEXT_FILE_CHARS, DEFAULT_CONTEXT_FILE_LIMIT,
    Temperatures,
};
pub use error::{Error, Result};
pub use extract::{DockerfileExtraction, JsonExtraction, extract_dockerfile, extract_json};
pub use file::{FileRecord, RepoSnapshot};
pub use filter::{DEFAULT_IGNORE_PATTERNS, IgnoreFilter, normalize_path};
pub use language::{FileType, Language};
pub use pipeline::{
    AnalysisReport, AnalysisRequest, AnalysisResponse, Analyzer, ContextPlan, ReportSummary,
    SelectionSource, plan_context,
};
pub use scanner::{DEFAULT_MAX_FILE_BYTES, load_snapshot};
pub use select::{DEFAULT_MAX_KEY_FILES, records_for_paths, select_key_files};
pub use token::{CharRatioEstimator, DEFAULT_CHARS_PER_TOKEN, TokenEstimator};
pub use tree::{FileLeaf, LeafKind, ProjectTree, TreeNode, TreeSummary, build_tree};
pub use truncate::{
    BudgetState, DEFAULT_TOKEN_BUDGET, TRUNCATION_MARKER, Truncation, TruncationPolicy, Truncator, truncate,
};

/// Loads a directory and computes its tree, key files and truncated context.
///
/// No completion is requested.
///
/// # Errors
///
/// Returns an error if:
/// - The ignore patterns in `config` do not compile
/// - No loadable files are found
///
/// # Examples
///
/// ```no_run
/// use repo_brief::{AnalyzerConfig, scan};
///
/// # fn main() -> anyhow::Result<()> {
/// let plan = scan(".", &AnalyzerConfig::default())?;
/// println!("{} key files", plan.key_files.len());
/// # Ok(())
/// # }
/// ```
pub fn scan(root: impl AsRef<std::path::Path>, config: &AnalyzerConfig) -> Result<ContextPlan> {
    let snapshot = load_snapshot(root.as_ref(), &config.ignore_filter()?, DEFAULT_MAX_FILE_BYTES)?;
    plan_context(&snapshot, config)
}
