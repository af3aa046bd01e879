use crate::{
    completion::{CompletionRequest, Stage, TextCompletion},
    config::AnalyzerConfig,
    error::{Error, Result},
    extract::{
        decode_object, decode_object_array, decode_string_list, describe, extract_dockerfile,
    },
    file::{FileRecord, RepoSnapshot},
    filter::IgnoreFilter,
    language::Language,
    prompt::{
        AnalysisContext, ContextFile, DockerfileContext, DocumentationContext, FallbackDocContext,
        Prompt, PromptRenderer, SelectionContext, ServerTemplateContext, ToolContext,
    },
    select::{records_for_paths, select_key_files},
    signals::{
        Endpoint, Framework, ProjectType, config_files, detect_frameworks, detect_project_type,
        extract_endpoints, fallback_dockerfile, fallback_server_template, fallback_tools,
    },
    tree::{TreeSummary, build_tree},
    truncate::{Truncation, Truncator},
};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One analysis job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisRequest {
    /// Caller-side identifier echoed back in the response
    #[serde(default)]
    pub repo_id: Option<String>,

    /// Display name; falls back to `repo_id`
    #[serde(default)]
    pub project_name: Option<String>,

    /// Free-form project description
    #[serde(default)]
    pub description: Option<String>,

    /// Repository snapshot (path -> content)
    pub files: RepoSnapshot,

    /// Explicit key-file list; replaces both model and heuristic selection
    #[serde(default)]
    pub selected_paths: Option<Vec<String>>,
}

impl AnalysisRequest {
    /// Creates a request for a snapshot.
    #[must_use]
    pub fn new(files: RepoSnapshot) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    fn display_name(&self) -> &str {
        self.project_name
            .as_deref()
            .or(self.repo_id.as_deref())
            .unwrap_or("project")
    }
}

/// Where the key-file list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// Importance scoring
    Heuristic,
    /// The completion collaborator
    Model,
    /// `selected_paths` in the request
    Request,
}

/// Tree, key files and truncated context for a snapshot.
///
/// Everything the pipeline computes before the first completion call.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPlan {
    /// File tree with ignore statistics
    pub tree: TreeSummary,
    /// Key files in ranking order
    pub key_files: Vec<FileRecord>,
    /// Origin of `key_files`
    pub selection: SelectionSource,
    /// Budgeted `path:content` entries
    pub context: Truncation,
}

/// Headline counts of a finished analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Entries in the analysis `api_endpoints` list
    pub api_endpoints: usize,
    /// Number of tool descriptors
    pub tools: usize,
    /// Analysis `architecture_pattern`, if any
    pub architecture: Option<String>,
    /// Analysis `main_technologies`
    pub technologies: Vec<String>,
}

impl ReportSummary {
    fn new(analysis: &Map<String, Value>, tools: &[Value]) -> Self {
        Self {
            api_endpoints: analysis
                .get("api_endpoints")
                .and_then(Value::as_array)
                .map_or(0, Vec::len),
            tools: tools.len(),
            architecture: analysis_str(analysis, "architecture_pattern").map(str::to_string),
            technologies: technologies(analysis).into_iter().map(str::to_string).collect(),
        }
    }
}

/// Result of a successful analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Echo of the request identifier
    pub repo_id: Option<String>,
    /// Display name used in prompts
    pub project_name: String,
    /// Local timestamp of report creation
    pub generated_at: String,
    /// Tree, key files and truncated context
    #[serde(flatten)]
    pub plan: ContextPlan,
    /// Heuristic project category
    pub project_type: ProjectType,
    /// Frameworks detected among the key files
    pub frameworks: Vec<Framework>,
    /// Routes found by pattern matching
    pub endpoints: Vec<Endpoint>,
    /// Decoded codebase analysis
    pub analysis: Map<String, Value>,
    /// Tool descriptors
    pub tools: Vec<Value>,
    /// Dockerfile text
    pub dockerfile: String,
    /// Markdown documentation
    pub documentation: String,
    /// Tool-server files by name, `documentation.md` included
    pub server_template: BTreeMap<String, String>,
    /// Headline counts
    pub summary: ReportSummary,
    /// Stages whose output is the deterministic fallback
    pub fallbacks: Vec<Stage>,
}

/// Top-level outcome handed to callers.
///
/// Serializes as `{"success": true, ...report}` or
/// `{"success": false, "error": "...", "repo_id": ...}`.
#[derive(Debug, Clone)]
pub enum AnalysisResponse {
    /// Pipeline finished
    Success(Box<AnalysisReport>),
    /// Pipeline aborted
    Failure {
        /// Error message
        error: String,
        /// Echo of the request identifier
        repo_id: Option<String>,
    },
}

impl AnalysisResponse {
    /// Returns true for a finished pipeline.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl Serialize for AnalysisResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Succeeded<'a> {
            success: bool,
            #[serde(flatten)]
            report: &'a AnalysisReport,
        }

        #[derive(Serialize)]
        struct Failed<'a> {
            success: bool,
            error: &'a str,
            repo_id: Option<&'a str>,
        }

        match self {
            Self::Success(report) => Succeeded {
                success: true,
                report,
            }
            .serialize(serializer),
            Self::Failure { error, repo_id } => Failed {
                success: false,
                error,
                repo_id: repo_id.as_deref(),
            }
            .serialize(serializer),
        }
    }
}

/// Computes the tree, heuristic key files and truncated context without
/// calling a collaborator.
///
/// # Errors
///
/// Returns an error if the configured ignore patterns do not compile.
pub fn plan_context(snapshot: &RepoSnapshot, config: &AnalyzerConfig) -> Result<ContextPlan> {
    let filter = config.ignore_filter()?;
    let truncator = Truncator::new(config.truncation_policy(), config.estimator());

    let tree = build_tree(snapshot, &filter);
    let key_files = select_key_files(snapshot, &filter, config.max_key_files);
    Ok(budget(tree, key_files, SelectionSource::Heuristic, &truncator))
}

fn budget(
    tree: TreeSummary,
    key_files: Vec<FileRecord>,
    selection: SelectionSource,
    truncator: &Truncator,
) -> ContextPlan {
    let entries: Vec<String> = key_files.iter().map(FileRecord::to_entry).collect();
    let context = truncator.truncate(&entries);

    for skipped in &context.skipped {
        debug!("{skipped}");
    }
    if let Some(path) = &context.truncated_path {
        debug!("Context budget exhausted at {path}");
    }

    ContextPlan {
        tree,
        key_files,
        selection,
        context,
    }
}

/// Signals derived from the key files and shared by the prompts and fallbacks.
struct Signals {
    languages: BTreeSet<Language>,
    configs: BTreeSet<&'static str>,
    project_type: ProjectType,
    frameworks: BTreeSet<Framework>,
    endpoints: Vec<Endpoint>,
}

impl Signals {
    fn collect(snapshot: &RepoSnapshot, filter: &IgnoreFilter, plan: &ContextPlan) -> Self {
        Self {
            languages: plan.tree.languages.clone(),
            configs: config_files(
                snapshot
                    .iter()
                    .map(|(path, _)| path)
                    .filter(|path| !filter.is_ignored(path)),
            ),
            project_type: detect_project_type(&plan.key_files),
            frameworks: detect_frameworks(&plan.key_files),
            endpoints: extract_endpoints(&plan.key_files),
        }
    }

    fn language_names(&self) -> Vec<&'static str> {
        self.languages.iter().map(|l| l.as_str()).collect()
    }

    fn framework_names(&self) -> Vec<&'static str> {
        self.frameworks.iter().map(|f| f.as_str()).collect()
    }
}

/// Runs the analysis pipeline against a completion collaborator.
///
/// Stages run in order and each completion is awaited before the next
/// prompt is rendered. Codebase analysis failures abort the run; the other
/// stages fall back to deterministic output.
pub struct Analyzer {
    config: AnalyzerConfig,
    completion: Arc<dyn TextCompletion>,
    filter: IgnoreFilter,
    truncator: Truncator,
    prompts: PromptRenderer,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Creates an analyzer.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - A prompt template fails to parse
    pub fn new(config: AnalyzerConfig, completion: Arc<dyn TextCompletion>) -> Result<Self> {
        config.validate()?;

        let filter = config.ignore_filter()?;
        let truncator = Truncator::new(config.truncation_policy(), config.estimator());
        let prompts = PromptRenderer::new()?;

        Ok(Self {
            config,
            completion,
            filter,
            truncator,
            prompts,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Runs the pipeline and wraps the outcome for callers.
    pub async fn respond(&self, request: AnalysisRequest) -> AnalysisResponse {
        let repo_id = request.repo_id.clone();
        match self.analyze(request).await {
            Ok(report) => AnalysisResponse::Success(Box::new(report)),
            Err(e) => {
                warn!("Analysis failed: {e}");
                AnalysisResponse::Failure {
                    error: e.to_string(),
                    repo_id,
                }
            }
        }
    }

    /// Runs the full pipeline.
    ///
    /// # Process
    ///
    /// 1. **Tree**: builds the project tree, skipping ignored paths
    /// 2. **Select**: request paths, then the model (if enabled), then scoring
    /// 3. **Truncate**: fits the key files into the token budget
    /// 4. **Analyze**: decodes a JSON object from the collaborator
    /// 5. **Generate**: tools, Dockerfile, documentation and the server template
    ///
    /// # Errors
    ///
    /// Returns an error if the codebase analysis completion fails or does not
    /// decode to a JSON object, or if a prompt fails to render.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use repo_brief::{AnalysisRequest, Analyzer, AnalyzerConfig, CommandCompletion, RepoSnapshot};
    /// use std::sync::Arc;
    ///
    /// # async fn demo() -> anyhow::Result<()> {
    /// let snapshot: RepoSnapshot = [("src/main.rs", "fn main() {}")].into_iter().collect();
    /// let analyzer = Analyzer::new(
    ///     AnalyzerConfig::default(),
    ///     Arc::new(CommandCompletion::new("./complete.sh")),
    /// )?;
    ///
    /// let report = analyzer.analyze(AnalysisRequest::new(snapshot)).await?;
    /// println!("{}", report.dockerfile);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(
        skip(self, request),
        fields(repo_id = request.repo_id.as_deref().unwrap_or(""), files = request.files.len())
    )]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport> {
        let start_time = Instant::now();
        let project_name = request.display_name().to_string();
        let mut fallbacks = Vec::new();

        announce(Stage::FileSelection, "Building tree and selecting key files");
        let plan = self.plan(&request, &project_name, &mut fallbacks).await?;
        info!(
            "✓ {} files in tree, {} key files ({:?}), {} tokens of context",
            plan.tree.total_files,
            plan.key_files.len(),
            plan.selection,
            plan.context.budget.total_tokens_used
        );

        let signals = Signals::collect(&request.files, &self.filter, &plan);

        announce(Stage::CodebaseAnalysis, "Analyzing codebase");
        let analysis = self
            .analyze_codebase(&request, &project_name, &plan, &signals)
            .await?;

        announce(Stage::ToolGeneration, "Generating tools");
        let tools = match self.generate_tools(&project_name, &analysis).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!("Tool generation failed, using fallback tools: {e}");
                fallbacks.push(Stage::ToolGeneration);
                fallback_tools(
                    &signals.languages,
                    &signals.configs,
                    &signals.endpoints,
                    signals.project_type,
                )
            }
        };

        announce(Stage::Dockerfile, "Generating Dockerfile");
        let dockerfile = match self
            .generate_dockerfile(&project_name, &plan, &signals, &analysis)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Dockerfile generation failed, using canned Dockerfile: {e}");
                fallbacks.push(Stage::Dockerfile);
                fallback_dockerfile(&signals.languages, &signals.configs).to_string()
            }
        };

        announce(Stage::Documentation, "Generating documentation");
        let documentation = match self
            .generate_documentation(&project_name, &analysis, &tools)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Documentation generation failed, using summary: {e}");
                fallbacks.push(Stage::Documentation);
                self.fallback_documentation(&project_name, &plan, &signals, &analysis, &tools)?
            }
        };

        announce(Stage::ServerTemplate, "Generating server template");
        let mut server_template = match self
            .generate_server_template(&project_name, &analysis, &tools)
            .await
        {
            Ok(files) => files,
            Err(e) => {
                warn!("Server template generation failed, using minimal template: {e}");
                fallbacks.push(Stage::ServerTemplate);
                fallback_server_template(&project_name, &tools, &dockerfile)
            }
        };
        server_template.insert("documentation.md".to_string(), documentation.clone());

        info!(
            "✓ Analysis completed in {:.2}s with {} fallback(s)",
            start_time.elapsed().as_secs_f64(),
            fallbacks.len()
        );

        Ok(AnalysisReport {
            repo_id: request.repo_id.clone(),
            project_name,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            project_type: signals.project_type,
            frameworks: signals.frameworks.iter().copied().collect(),
            endpoints: signals.endpoints,
            summary: ReportSummary::new(&analysis, &tools),
            plan,
            analysis,
            tools,
            dockerfile,
            documentation,
            server_template,
            fallbacks,
        })
    }

    async fn plan(
        &self,
        request: &AnalysisRequest,
        project_name: &str,
        fallbacks: &mut Vec<Stage>,
    ) -> Result<ContextPlan> {
        let snapshot = &request.files;
        let max_files = self.config.max_key_files;
        let tree = build_tree(snapshot, &self.filter);
        let heuristic = select_key_files(snapshot, &self.filter, max_files);

        if let Some(paths) = request.selected_paths.as_deref() {
            let records = records_for_paths(snapshot, &self.filter, paths, max_files);
            if records.is_empty() {
                warn!("None of the {} requested paths are usable, using heuristic selection", paths.len());
            } else {
                return Ok(budget(tree, records, SelectionSource::Request, &self.truncator));
            }
        } else if self.config.llm_file_selection && !snapshot.is_empty() {
            match self
                .select_with_model(request, project_name, &tree, &heuristic)
                .await
            {
                Ok(records) => {
                    return Ok(budget(tree, records, SelectionSource::Model, &self.truncator));
                }
                Err(e) => {
                    warn!("Model file selection failed, using heuristic selection: {e}");
                    fallbacks.push(Stage::FileSelection);
                }
            }
        }

        Ok(budget(tree, heuristic, SelectionSource::Heuristic, &self.truncator))
    }

    async fn select_with_model(
        &self,
        request: &AnalysisRequest,
        project_name: &str,
        tree: &TreeSummary,
        heuristic: &[FileRecord],
    ) -> Result<Vec<FileRecord>> {
        let stage = Stage::FileSelection;
        let rendered_tree = tree.structure.render();
        let ctx = SelectionContext {
            project_name,
            description: request.description.as_deref(),
            tree: &rendered_tree,
            total_files: tree.total_files,
            max_files: self.config.max_key_files,
            candidates: heuristic.iter().map(|r| r.path.as_str()).collect(),
        };
        let raw = self.complete(stage, self.prompts.render(stage, &ctx)?).await?;
        let paths = decode_string_list(stage.label(), &raw)?;

        let records =
            records_for_paths(&request.files, &self.filter, &paths, self.config.max_key_files);
        if records.is_empty() {
            return Err(Error::invalid_shape(
                stage.label(),
                "paths present in the snapshot",
                format!("{} unknown paths", paths.len()),
            ));
        }
        Ok(records)
    }

    async fn analyze_codebase(
        &self,
        request: &AnalysisRequest,
        project_name: &str,
        plan: &ContextPlan,
        signals: &Signals,
    ) -> Result<Map<String, Value>> {
        let stage = Stage::CodebaseAnalysis;
        let rendered_tree = plan.tree.structure.render();
        let ctx = AnalysisContext {
            project_name,
            description: request.description.as_deref(),
            tree: &rendered_tree,
            project_type: signals.project_type,
            languages: signals.language_names(),
            frameworks: signals.framework_names(),
            config_files: signals.configs.iter().copied().collect(),
            file_count: request.files.len(),
            size_chars: request.files.total_chars(),
            endpoints: &signals.endpoints,
            files: plan
                .context
                .entries
                .iter()
                .filter_map(|entry| entry.split_once(':'))
                .take(self.config.context_file_limit)
                .map(|(path, content)| ContextFile { path, content })
                .collect(),
            file_chars: self.config.context_file_chars,
        };

        let raw = self.complete(stage, self.prompts.render(stage, &ctx)?).await?;
        decode_object(stage.label(), &raw)
    }

    async fn generate_tools(
        &self,
        project_name: &str,
        analysis: &Map<String, Value>,
    ) -> Result<Vec<Value>> {
        let stage = Stage::ToolGeneration;
        let ctx = ToolContext {
            project_name,
            analysis,
            architecture: analysis_str(analysis, "architecture_pattern").unwrap_or("Unknown"),
            technologies: technologies(analysis),
        };

        let raw = self.complete(stage, self.prompts.render(stage, &ctx)?).await?;
        let tools = decode_object_array(stage.label(), &raw)?;
        Ok(tools.into_iter().map(Value::Object).collect())
    }

    async fn generate_dockerfile(
        &self,
        project_name: &str,
        plan: &ContextPlan,
        signals: &Signals,
        analysis: &Map<String, Value>,
    ) -> Result<String> {
        let stage = Stage::Dockerfile;
        let ctx = DockerfileContext {
            project_name,
            project_type: signals.project_type,
            languages: signals.language_names(),
            frameworks: signals.framework_names(),
            config_files: signals.configs.iter().copied().collect(),
            summary: analysis_str(analysis, "project_summary"),
            key_files: &plan.key_files,
        };

        let raw = self.complete(stage, self.prompts.render(stage, &ctx)?).await?;
        let extraction = extract_dockerfile(&raw);
        debug!(outcome = extraction.kind(), "Extracted Dockerfile");

        extraction
            .text()
            .map(str::to_string)
            .ok_or_else(|| Error::empty_response(stage.label()))
    }

    async fn generate_documentation(
        &self,
        project_name: &str,
        analysis: &Map<String, Value>,
        tools: &[Value],
    ) -> Result<String> {
        let stage = Stage::Documentation;
        let ctx = DocumentationContext {
            project_name,
            analysis,
            tools,
        };

        let raw = self.complete(stage, self.prompts.render(stage, &ctx)?).await?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(Error::empty_response(stage.label()));
        }
        Ok(text.to_string())
    }

    async fn generate_server_template(
        &self,
        project_name: &str,
        analysis: &Map<String, Value>,
        tools: &[Value],
    ) -> Result<BTreeMap<String, String>> {
        let stage = Stage::ServerTemplate;
        let ctx = ServerTemplateContext {
            project_name,
            tools,
            technologies: technologies(analysis),
        };

        let raw = self.complete(stage, self.prompts.render(stage, &ctx)?).await?;
        let files = decode_object(stage.label(), &raw)?;
        if files.is_empty() {
            return Err(Error::invalid_shape(
                stage.label(),
                "object of file contents",
                "empty object",
            ));
        }

        files
            .into_iter()
            .map(|(name, content)| match content {
                Value::String(text) => Ok((name, text)),
                other => Err(Error::invalid_shape(
                    stage.label(),
                    "object of file contents",
                    format!("{name} holding a {}", describe(&other)),
                )),
            })
            .collect()
    }

    fn fallback_documentation(
        &self,
        project_name: &str,
        plan: &ContextPlan,
        signals: &Signals,
        analysis: &Map<String, Value>,
        tools: &[Value],
    ) -> Result<String> {
        let summary = analysis_str(analysis, "project_summary").map_or_else(
            || format!("Project with {} files", plan.tree.total_files),
            str::to_string,
        );
        let mut technologies = technologies(analysis);
        if technologies.is_empty() {
            technologies = signals.language_names();
        }

        self.prompts.render_fallback_documentation(&FallbackDocContext {
            project_name,
            summary: &summary,
            technologies,
            tool_count: tools.len(),
            tool_names: tools
                .iter()
                .filter_map(|tool| tool.get("name").and_then(Value::as_str))
                .collect(),
        })
    }

    async fn complete(&self, stage: Stage, prompt: Prompt) -> Result<String> {
        let request = CompletionRequest {
            stage,
            system: prompt.system.to_string(),
            user: prompt.user,
            temperature: self.config.temperatures.for_stage(stage),
            model: self.config.model.clone(),
        };
        debug!("Requesting {stage} ({} prompt chars)", request.user.chars().count());

        let raw = self.completion.complete(&request).await?;
        if raw.trim().is_empty() {
            return Err(Error::empty_response(stage.label()));
        }
        Ok(raw)
    }
}

/// Logs the start of a stage with its position in [`Stage::ALL`].
fn announce(stage: Stage, action: &str) {
    info!("Stage {}/{}: {action}...", step(stage), Stage::ALL.len());
}

fn step(stage: Stage) -> usize {
    Stage::ALL.iter().position(|s| *s == stage).map_or(0, |idx| idx + 1)
}

fn analysis_str<'a>(analysis: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    analysis
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn technologies(analysis: &Map<String, Value>) -> Vec<&str> {
    analysis
        .get("main_technologies")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ANALYSIS: &str = r#"Here is the analysis:
```json
{
  "api_endpoints": [{"method": "GET", "path": "/users", "file": "src/api/users.js"}],
  "project_summary": "A small user service",
  "architecture_pattern": "REST API",
  "main_technologies": ["Express", "Node.js"]
}
```"#;

    const TOOLS: &str = r#"[{"name": "list-users", "title": "List Users", "description": "Calls GET /users", "input_schema": {}, "category": "api", "purpose": "Smoke test"}]"#;

    const DOCKERFILE: &str = "Here is the Dockerfile:\n```dockerfile\nFROM node:18-alpine\nWORKDIR /app\nCOPY . .\nCMD [\"node\", \"src/index.js\"]\n```\nTo build it, run docker build.";

    const SERVER_TEMPLATE: &str = r##"```json
{"package.json": "{\"name\": \"demo-tool-server\"}", "server.ts": "console.log('up');", "Dockerfile": "FROM node:18-alpine", "README.md": "# demo server"}
```"##;

    /// Replays canned completions per stage and records the call order.
    #[derive(Default)]
    struct ScriptedCompletion {
        replies: Mutex<HashMap<Stage, Result<String>>>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn with(mut self, stage: Stage, reply: Result<&str>) -> Self {
            self.replies
                .get_mut()
                .unwrap()
                .insert(stage, reply.map(str::to_string));
            self
        }

        fn happy() -> Self {
            Self::default()
                .with(Stage::CodebaseAnalysis, Ok(ANALYSIS))
                .with(Stage::ToolGeneration, Ok(TOOLS))
                .with(Stage::Dockerfile, Ok(DOCKERFILE))
                .with(Stage::Documentation, Ok("# demo - Developer Guide\n\nHello.\n"))
                .with(Stage::ServerTemplate, Ok(SERVER_TEMPLATE))
        }

        fn stages(&self) -> Vec<Stage> {
            self.calls.lock().unwrap().iter().map(|r| r.stage).collect()
        }
    }

    #[async_trait::async_trait]
    impl TextCompletion for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .get(&request.stage)
                .cloned()
                .unwrap_or_else(|| Err(Error::completion(request.stage.label(), "no reply scripted")))
        }
    }

    fn snapshot() -> RepoSnapshot {
        vec![
            (
                "package.json",
                r#"{"name": "demo", "dependencies": {"express": "^4.18.0"}}"#,
            ),
            (
                "src/index.js",
                "const express = require('express');\nconst app = express();\napp.listen(3000);\n",
            ),
            (
                "src/api/users.js",
                "const express = require('express');\nconst router = express.Router();\nrouter.get('/users', (req, res) => res.json([]));\nmodule.exports = router;\n",
            ),
            ("node_modules/express/index.js", "module.exports = require('./lib/express');"),
            ("README.md", "# demo\n\nA small user service used in tests of the pipeline.\n"),
        ]
        .into_iter()
        .collect()
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            repo_id: Some("repo-1".to_string()),
            project_name: Some("demo".to_string()),
            ..AnalysisRequest::new(snapshot())
        }
    }

    fn analyzer(completion: &Arc<ScriptedCompletion>, config: AnalyzerConfig) -> Analyzer {
        let completion: Arc<dyn TextCompletion> = completion.clone();
        Analyzer::new(config, completion).unwrap()
    }

    #[tokio::test]
    async fn test_full_run_without_fallbacks() {
        let completion = Arc::new(ScriptedCompletion::happy());
        let config = AnalyzerConfig::builder().model("test-model").build().unwrap();
        let report = analyzer(&completion, config).analyze(request()).await.unwrap();

        assert_eq!(
            completion.stages(),
            vec![
                Stage::CodebaseAnalysis,
                Stage::ToolGeneration,
                Stage::Dockerfile,
                Stage::Documentation,
                Stage::ServerTemplate
            ]
        );
        assert!(report.fallbacks.is_empty());
        assert_eq!(report.plan.selection, SelectionSource::Heuristic);
        assert_eq!(report.plan.tree.total_files, 5);
        assert_eq!(report.plan.tree.retained_files, 4);
        assert_eq!(report.plan.tree.ignored_files, 1);
        assert!(report.plan.key_files.iter().all(|f| !f.path.starts_with("node_modules")));
        assert_eq!(report.analysis["architecture_pattern"], "REST API");
        assert_eq!(report.tools.len(), 1);
        assert_eq!(report.tools[0]["name"], "list-users");
        assert_eq!(
            report.dockerfile,
            "FROM node:18-alpine\nWORKDIR /app\nCOPY . .\nCMD [\"node\", \"src/index.js\"]"
        );
        assert!(report.documentation.starts_with("# demo - Developer Guide"));
        assert!(report.frameworks.contains(&Framework::Express));
        assert!(report.endpoints.iter().any(|e| e.method == "GET" && e.path == "/users"));

        assert_eq!(
            report.server_template.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Dockerfile", "README.md", "documentation.md", "package.json", "server.ts"]
        );
        assert_eq!(report.server_template["server.ts"], "console.log('up');");
        assert_eq!(report.server_template["documentation.md"], report.documentation);
        assert_eq!(
            report.summary,
            ReportSummary {
                api_endpoints: 1,
                tools: 1,
                architecture: Some("REST API".to_string()),
                technologies: vec!["Express".to_string(), "Node.js".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_server_template_rejects_non_string_files() {
        let completion = Arc::new(
            ScriptedCompletion::happy()
                .with(Stage::ServerTemplate, Ok(r#"{"server.ts": 42}"#)),
        );
        let report = analyzer(&completion, AnalyzerConfig::default())
            .analyze(request())
            .await
            .unwrap();

        assert_eq!(report.fallbacks, vec![Stage::ServerTemplate]);
        assert_eq!(report.server_template["Dockerfile"], report.dockerfile);
        assert!(report.server_template["package.json"].contains("demo-tool-server"));
        assert!(report.server_template["server.ts"].contains("// tool: list-users"));
        assert_eq!(report.server_template["documentation.md"], report.documentation);

        let calls = completion.calls.lock().unwrap();
        let server = calls.iter().find(|c| c.stage == Stage::ServerTemplate).unwrap();
        assert!((server.temperature - 0.3).abs() < f32::EPSILON);
        assert!(server.user.contains("\"name\": \"list-users\""));
        assert!(server.user.contains("PROJECT TECHNOLOGIES: Express, Node.js"));
    }

    #[test]
    fn test_stage_steps_follow_pipeline_order() {
        assert_eq!(step(Stage::FileSelection), 1);
        assert_eq!(step(Stage::CodebaseAnalysis), 2);
        assert_eq!(step(Stage::ServerTemplate), Stage::ALL.len());
    }

    #[test]
    fn test_summary_without_analysis_fields() {
        let summary = ReportSummary::new(&Map::new(), &[Value::Null, Value::Null]);
        assert_eq!(summary.api_endpoints, 0);
        assert_eq!(summary.tools, 2);
        assert!(summary.architecture.is_none());
        assert!(summary.technologies.is_empty());
    }

    #[tokio::test]
    async fn test_requests_carry_model_and_temperature() {
        let completion = Arc::new(ScriptedCompletion::happy());
        let config = AnalyzerConfig::builder().model("test-model").build().unwrap();
        analyzer(&completion, config).analyze(request()).await.unwrap();

        let calls = completion.calls.lock().unwrap();
        assert!(calls.iter().all(|c| c.model.as_deref() == Some("test-model")));
        let tools = calls.iter().find(|c| c.stage == Stage::ToolGeneration).unwrap();
        assert!((tools.temperature - 0.7).abs() < f32::EPSILON);
        assert!(tools.user.contains("\"architecture_pattern\": \"REST API\""));

        let analysis = calls.iter().find(|c| c.stage == Stage::CodebaseAnalysis).unwrap();
        assert!(analysis.user.contains("--- src/api/users.js ---"));
        assert!(analysis.user.contains("- GET /users (src/api/users.js)"));
    }

    #[tokio::test]
    async fn test_analysis_decode_failure_aborts() {
        let completion = Arc::new(
            ScriptedCompletion::happy().with(Stage::CodebaseAnalysis, Ok("I could not analyze this")),
        );
        let analyzer = analyzer(&completion, AnalyzerConfig::default());

        let err = analyzer.analyze(request()).await.unwrap_err();
        assert!(err.is_extraction());
        assert_eq!(completion.stages(), vec![Stage::CodebaseAnalysis]);

        let response = analyzer.respond(request()).await;
        assert!(!response.is_success());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["repo_id"], "repo-1");
        assert!(json["error"].as_str().unwrap().contains("codebase analysis"));
    }

    #[tokio::test]
    async fn test_analysis_shape_and_empty_response() {
        let completion =
            Arc::new(ScriptedCompletion::happy().with(Stage::CodebaseAnalysis, Ok("[1, 2]")));
        let err = analyzer(&completion, AnalyzerConfig::default())
            .analyze(request())
            .await
            .unwrap_err();
        assert!(err.is_invalid_shape());

        let completion =
            Arc::new(ScriptedCompletion::happy().with(Stage::CodebaseAnalysis, Ok("  \n")));
        let err = analyzer(&completion, AnalyzerConfig::default())
            .analyze(request())
            .await
            .unwrap_err();
        assert!(err.is_empty_response());
    }

    #[tokio::test]
    async fn test_generation_fallbacks() {
        let completion = Arc::new(
            ScriptedCompletion::happy()
                .with(Stage::ToolGeneration, Ok(r#"{"name": "not-a-list"}"#))
                .with(Stage::Dockerfile, Ok("I am unable to help with that."))
                .with(
                    Stage::Documentation,
                    Err(Error::completion("documentation generation", "offline")),
                )
                .with(Stage::ServerTemplate, Ok("{}")),
        );
        let report = analyzer(&completion, AnalyzerConfig::default())
            .analyze(request())
            .await
            .unwrap();

        assert_eq!(
            report.fallbacks,
            vec![
                Stage::ToolGeneration,
                Stage::Dockerfile,
                Stage::Documentation,
                Stage::ServerTemplate
            ]
        );
        assert_eq!(report.tools[0]["name"], "analyze-project-structure");
        assert!(report.dockerfile.starts_with("FROM node"));
        assert!(report.documentation.starts_with("# demo Documentation"));
        assert!(report.documentation.contains("A small user service"));
        assert!(report.documentation.contains("Express, Node.js"));
        assert_eq!(report.summary.tools, report.tools.len());
        assert!(report.server_template["server.ts"].contains("// tool: analyze-project-structure"));
    }

    #[tokio::test]
    async fn test_requested_paths_take_precedence() {
        let completion = Arc::new(ScriptedCompletion::happy());
        let config = AnalyzerConfig::builder()
            .llm_file_selection(true)
            .build()
            .unwrap();
        let request = AnalysisRequest {
            selected_paths: Some(vec!["README.md".to_string(), "missing.js".to_string()]),
            ..request()
        };
        let report = analyzer(&completion, config).analyze(request).await.unwrap();

        assert_eq!(report.plan.selection, SelectionSource::Request);
        assert_eq!(report.plan.key_files.len(), 1);
        assert_eq!(report.plan.key_files[0].path, "README.md");
        assert!(!completion.stages().contains(&Stage::FileSelection));
    }

    #[tokio::test]
    async fn test_model_selection() {
        let completion = Arc::new(
            ScriptedCompletion::happy()
                .with(Stage::FileSelection, Ok(r#"```json
["src/index.js", "node_modules/express/index.js", "package.json"]
```"#)),
        );
        let config = AnalyzerConfig::builder()
            .llm_file_selection(true)
            .build()
            .unwrap();
        let report = analyzer(&completion, config).analyze(request()).await.unwrap();

        assert_eq!(completion.stages()[0], Stage::FileSelection);
        assert_eq!(report.plan.selection, SelectionSource::Model);
        let paths: Vec<_> = report.plan.key_files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/index.js", "package.json"]);
    }

    #[tokio::test]
    async fn test_model_selection_falls_back_to_heuristic() {
        let completion = Arc::new(
            ScriptedCompletion::happy().with(Stage::FileSelection, Ok(r#"{"files": []}"#)),
        );
        let config = AnalyzerConfig::builder()
            .llm_file_selection(true)
            .build()
            .unwrap();
        let report = analyzer(&completion, config).analyze(request()).await.unwrap();

        assert_eq!(report.plan.selection, SelectionSource::Heuristic);
        assert_eq!(report.fallbacks, vec![Stage::FileSelection]);
        assert!(!report.plan.key_files.is_empty());
    }

    #[tokio::test]
    async fn test_success_response_shape() {
        let completion = Arc::new(ScriptedCompletion::happy());
        let response = analyzer(&completion, AnalyzerConfig::default())
            .respond(request())
            .await;

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["repo_id"], "repo-1");
        assert_eq!(json["project_name"], "demo");
        assert_eq!(json["selection"], "heuristic");
        assert_eq!(json["tree"]["total_files"], 5);
        assert_eq!(json["summary"]["api_endpoints"], 1);
        assert_eq!(json["summary"]["architecture"], "REST API");
        assert!(json["server_template"]["documentation.md"].is_string());
        assert!(json["context"]["entries"].is_array());
        assert!(json["fallbacks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_request_deserialization() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"repo_id": "r", "files": {"b.py": "x = 1", "a.py": "y = 2"}}"#,
        )
        .unwrap();

        assert_eq!(request.display_name(), "r");
        assert_eq!(request.files.len(), 2);
        assert!(request.selected_paths.is_none());
        assert_eq!(AnalysisRequest::default().display_name(), "project");
    }

    #[test]
    fn test_plan_context_for_empty_snapshot() {
        let plan = plan_context(&RepoSnapshot::new(), &AnalyzerConfig::default()).unwrap();

        assert_eq!(plan.tree.total_files, 0);
        assert_eq!(plan.tree.directory_count, 0);
        assert!(plan.key_files.is_empty());
        assert!(plan.context.entries.is_empty());
    }

    #[test]
    fn test_plan_context_respects_budget() {
        let config = AnalyzerConfig::builder()
            .token_budget(200)
            .min_remaining_tokens(10)
            .build()
            .unwrap();
        let big = format!("import os\n{}", "x = 1\n".repeat(400));
        let snapshot: RepoSnapshot = vec![("main.py", big.as_str()), ("README.md", "# readme text here, long enough")]
            .into_iter()
            .collect();

        let plan = plan_context(&snapshot, &config).unwrap();
        assert!(plan.context.budget.total_tokens_used <= 200);
        assert!(plan.context.exhausted);
    }
}
