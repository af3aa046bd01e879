use crate::{
    completion::Stage,
    error::{Error, Result},
    filter::IgnoreFilter,
    select::DEFAULT_MAX_KEY_FILES,
    token::{CharRatioEstimator, DEFAULT_CHARS_PER_TOKEN, TokenEstimator},
    truncate::{
        DEFAULT_HEAD_TAIL_THRESHOLD_CHARS, DEFAULT_MIN_REMAINING_TOKENS, DEFAULT_TOKEN_BUDGET,
        TruncationPolicy,
    },
};
use serde::Serialize;
use std::sync::Arc;

/// Default number of truncated files included in the analysis prompt.
pub const DEFAULT_CONTEXT_FILE_LIMIT: usize = 10;

/// Default per-file character cap in the analysis prompt.
pub const DEFAULT_CONTEXT_FILE_CHARS: usize = 2_000;

/// Sampling temperature per completion stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Temperatures {
    /// Model-driven file selection
    pub selection: f32,
    /// Codebase analysis
    pub analysis: f32,
    /// Tool generation
    pub tools: f32,
    /// Dockerfile generation
    pub dockerfile: f32,
    /// Documentation generation
    pub documentation: f32,
    /// Server template generation
    pub server_template: f32,
}

impl Temperatures {
    /// Returns the temperature used for a stage.
    #[must_use]
    pub const fn for_stage(&self, stage: Stage) -> f32 {
        match stage {
            Stage::FileSelection => self.selection,
            Stage::CodebaseAnalysis => self.analysis,
            Stage::ToolGeneration => self.tools,
            Stage::Dockerfile => self.dockerfile,
            Stage::Documentation => self.documentation,
            Stage::ServerTemplate => self.server_template,
        }
    }
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            selection: 0.3,
            analysis: 0.3,
            tools: 0.7,
            dockerfile: 0.3,
            documentation: 0.4,
            server_template: 0.3,
        }
    }
}

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct AnalyzerConfig {
    /// Maximum number of key files kept by the selector
    pub max_key_files: usize,

    /// Token ceiling for the truncated context
    pub token_budget: usize,

    /// Characters per estimated token
    pub chars_per_token: usize,

    /// Stop instead of cutting an entry when fewer tokens remain
    pub min_remaining_tokens: usize,

    /// Character allowance above which a cut keeps both head and tail
    pub head_tail_threshold_chars: usize,

    /// Number of truncated files shown in the analysis prompt
    pub context_file_limit: usize,

    /// Per-file character cap in the analysis prompt
    pub context_file_chars: usize,

    /// Model identifier passed to the completion collaborator
    pub model: Option<String>,

    /// Per-stage sampling temperatures
    pub temperatures: Temperatures,

    /// Ask the collaborator to choose key files before the heuristic
    pub llm_file_selection: bool,

    /// Glob patterns excluded on top of the built-in ignore list
    pub extra_ignore_patterns: Vec<String>,
}

impl AnalyzerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero, the remaining-token floor is not
    /// below the budget, or an ignore pattern does not compile.
    pub fn validate(&self) -> Result<()> {
        if self.token_budget == 0 {
            return Err(Error::config("token_budget must be greater than 0"));
        }

        if self.chars_per_token == 0 {
            return Err(Error::config("chars_per_token must be greater than 0"));
        }

        if self.max_key_files == 0 {
            return Err(Error::config("max_key_files must be greater than 0"));
        }

        if self.min_remaining_tokens >= self.token_budget {
            return Err(Error::config(format!(
                "min_remaining_tokens ({}) must be less than token_budget ({})",
                self.min_remaining_tokens, self.token_budget
            )));
        }

        self.ignore_filter()?;
        Ok(())
    }

    /// Compiles the ignore filter for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if an extra pattern fails to compile.
    pub fn ignore_filter(&self) -> Result<IgnoreFilter> {
        IgnoreFilter::with_defaults(&self.extra_ignore_patterns)
    }

    /// Returns the truncation limits.
    #[must_use]
    pub const fn truncation_policy(&self) -> TruncationPolicy {
        TruncationPolicy {
            token_budget: self.token_budget,
            min_remaining_tokens: self.min_remaining_tokens,
            head_tail_threshold_chars: self.head_tail_threshold_chars,
        }
    }

    /// Returns the token estimator for this configuration.
    #[must_use]
    pub fn estimator(&self) -> Arc<dyn TokenEstimator> {
        CharRatioEstimator::new(self.chars_per_token).shared()
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_key_files: DEFAULT_MAX_KEY_FILES,
            token_budget: DEFAULT_TOKEN_BUDGET,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            min_remaining_tokens: DEFAULT_MIN_REMAINING_TOKENS,
            head_tail_threshold_chars: DEFAULT_HEAD_TAIL_THRESHOLD_CHARS,
            context_file_limit: DEFAULT_CONTEXT_FILE_LIMIT,
            context_file_chars: DEFAULT_CONTEXT_FILE_CHARS,
            model: None,
            temperatures: Temperatures::default(),
            llm_file_selection: false,
            extra_ignore_patterns: Vec::new(),
        }
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug, Default)]
pub struct AnalyzerConfigBuilder {
    max_key_files: Option<usize>,
    token_budget: Option<usize>,
    chars_per_token: Option<usize>,
    min_remaining_tokens: Option<usize>,
    head_tail_threshold_chars: Option<usize>,
    context_file_limit: Option<usize>,
    context_file_chars: Option<usize>,
    model: Option<String>,
    temperatures: Option<Temperatures>,
    llm_file_selection: bool,
    extra_ignore_patterns: Vec<String>,
}

impl AnalyzerConfigBuilder {
    /// Sets the maximum number of key files.
    #[must_use]
    pub const fn max_key_files(mut self, count: usize) -> Self {
        self.max_key_files = Some(count);
        self
    }

    /// Sets the token budget for the truncated context.
    #[must_use]
    pub const fn token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = Some(tokens);
        self
    }

    /// Sets the characters-per-token ratio.
    #[must_use]
    pub const fn chars_per_token(mut self, ratio: usize) -> Self {
        self.chars_per_token = Some(ratio);
        self
    }

    /// Sets the remaining-token floor below which no entry is cut.
    #[must_use]
    pub const fn min_remaining_tokens(mut self, tokens: usize) -> Self {
        self.min_remaining_tokens = Some(tokens);
        self
    }

    /// Sets the head/tail split threshold in characters.
    #[must_use]
    pub const fn head_tail_threshold_chars(mut self, chars: usize) -> Self {
        self.head_tail_threshold_chars = Some(chars);
        self
    }

    /// Sets how many files the analysis prompt shows.
    #[must_use]
    pub const fn context_file_limit(mut self, count: usize) -> Self {
        self.context_file_limit = Some(count);
        self
    }

    /// Sets the per-file character cap in the analysis prompt.
    #[must_use]
    pub const fn context_file_chars(mut self, chars: usize) -> Self {
        self.context_file_chars = Some(chars);
        self
    }

    /// Sets the model identifier passed to the collaborator.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the per-stage temperatures.
    #[must_use]
    pub const fn temperatures(mut self, temperatures: Temperatures) -> Self {
        self.temperatures = Some(temperatures);
        self
    }

    /// Enables or disables model-driven file selection.
    #[must_use]
    pub const fn llm_file_selection(mut self, enabled: bool) -> Self {
        self.llm_file_selection = enabled;
        self
    }

    /// Adds glob patterns to exclude.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use repo_brief::AnalyzerConfig;
    ///
    /// let config = AnalyzerConfig::builder()
    ///     .extra_ignore_patterns(["**/*.snap", "fixtures/**"])
    ///     .build()
    ///     .expect("valid config");
    /// ```
    #[must_use]
    pub fn extra_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_ignore_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<AnalyzerConfig> {
        let config = AnalyzerConfig {
            max_key_files: self.max_key_files.unwrap_or(DEFAULT_MAX_KEY_FILES),
            token_budget: self.token_budget.unwrap_or(DEFAULT_TOKEN_BUDGET),
            chars_per_token: self.chars_per_token.unwrap_or(DEFAULT_CHARS_PER_TOKEN),
            min_remaining_tokens: self
                .min_remaining_tokens
                .unwrap_or(DEFAULT_MIN_REMAINING_TOKENS),
            head_tail_threshold_chars: self
                .head_tail_threshold_chars
                .unwrap_or(DEFAULT_HEAD_TAIL_THRESHOLD_CHARS),
            context_file_limit: self.context_file_limit.unwrap_or(DEFAULT_CONTEXT_FILE_LIMIT),
            context_file_chars: self.context_file_chars.unwrap_or(DEFAULT_CONTEXT_FILE_CHARS),
            model: self.model,
            temperatures: self.temperatures.unwrap_or_default(),
            llm_file_selection: self.llm_file_selection,
            extra_ignore_patterns: self.extra_ignore_patterns,
        };

        config.validate()?;
        Ok(config)
    }
}
