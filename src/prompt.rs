use crate::{
    completion::Stage,
    error::{Error, Result},
    file::FileRecord,
    signals::{Endpoint, ProjectType},
    truncate::{TRUNCATION_MARKER, char_prefix},
};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use tera::{Context, Tera, Value};

const SELECTION_SYSTEM: &str = "You are an expert software architect choosing which files \
best explain a codebase. Return a valid JSON array only.";

const ANALYSIS_SYSTEM: &str =
    "You are an expert software architect analyzing codebases. Return valid JSON only.";

const TOOLS_SYSTEM: &str = "You are an expert at building practical developer tools that \
people actually want to use. Return a valid JSON array only.";

const DOCKERFILE_SYSTEM: &str = "You are an expert at writing production-ready Dockerfiles. \
Prefer small, secure, multi-stage builds where they help.";

const DOCUMENTATION_SYSTEM: &str = "You are a technical writer producing developer \
documentation that helps people understand and work on a codebase.";

const SERVER_TEMPLATE_SYSTEM: &str = "You are an expert Node.js developer creating \
production-ready tool servers. Generate complete, working TypeScript and return a valid JSON \
object of file contents only.";

const FALLBACK_DOCUMENTATION: &str = "fallback_documentation";

/// A rendered prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Prompt {
    /// System prompt
    pub(crate) system: &'static str,
    /// User prompt
    pub(crate) user: String,
}

/// Context for the file-selection prompt.
#[derive(Debug, Serialize)]
pub(crate) struct SelectionContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) tree: &'a str,
    pub(crate) total_files: usize,
    pub(crate) max_files: usize,
    pub(crate) candidates: Vec<&'a str>,
}

/// One file excerpt in the analysis prompt.
#[derive(Debug, Serialize)]
pub(crate) struct ContextFile<'a> {
    pub(crate) path: &'a str,
    pub(crate) content: &'a str,
}

/// Context for the codebase-analysis prompt.
#[derive(Debug, Serialize)]
pub(crate) struct AnalysisContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) tree: &'a str,
    pub(crate) project_type: ProjectType,
    pub(crate) languages: Vec<&'static str>,
    pub(crate) frameworks: Vec<&'static str>,
    pub(crate) config_files: Vec<&'static str>,
    pub(crate) file_count: usize,
    pub(crate) size_chars: usize,
    pub(crate) endpoints: &'a [Endpoint],
    pub(crate) files: Vec<ContextFile<'a>>,
    /// Per-file character cap applied while rendering
    pub(crate) file_chars: usize,
}

/// Context for the tool-generation prompt.
#[derive(Debug, Serialize)]
pub(crate) struct ToolContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) analysis: &'a Map<String, JsonValue>,
    pub(crate) architecture: &'a str,
    pub(crate) technologies: Vec<&'a str>,
}

/// Context for the Dockerfile prompt.
#[derive(Debug, Serialize)]
pub(crate) struct DockerfileContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) project_type: ProjectType,
    pub(crate) languages: Vec<&'static str>,
    pub(crate) frameworks: Vec<&'static str>,
    pub(crate) config_files: Vec<&'static str>,
    pub(crate) summary: Option<&'a str>,
    pub(crate) key_files: &'a [FileRecord],
}

/// Context for the documentation prompt.
#[derive(Debug, Serialize)]
pub(crate) struct DocumentationContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) analysis: &'a Map<String, JsonValue>,
    pub(crate) tools: &'a [JsonValue],
}

/// Context for the server-template prompt.
#[derive(Debug, Serialize)]
pub(crate) struct ServerTemplateContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) tools: &'a [JsonValue],
    pub(crate) technologies: Vec<&'a str>,
}

/// Context for the deterministic documentation used when the completion fails.
#[derive(Debug, Serialize)]
pub(crate) struct FallbackDocContext<'a> {
    pub(crate) project_name: &'a str,
    pub(crate) summary: &'a str,
    pub(crate) technologies: Vec<&'a str>,
    pub(crate) tool_count: usize,
    pub(crate) tool_names: Vec<&'a str>,
}

/// Renders the prompts for each completion stage.
pub(crate) struct PromptRenderer {
    tera: Tera,
}

impl std::fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRenderer").finish_non_exhaustive()
    }
}

impl PromptRenderer {
    /// Creates a renderer with the built-in templates registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub(crate) fn new() -> Result<Self> {
        let mut tera = Tera::default();

        Self::register_filters(&mut tera);
        Self::register_builtin_templates(&mut tera)?;

        Ok(Self { tera })
    }

    fn register_builtin_templates(tera: &mut Tera) -> Result<()> {
        let templates = [
            (
                template_name(Stage::FileSelection),
                include_str!("../templates/file_selection.tera"),
            ),
            (
                template_name(Stage::CodebaseAnalysis),
                include_str!("../templates/codebase_analysis.tera"),
            ),
            (
                template_name(Stage::ToolGeneration),
                include_str!("../templates/tool_generation.tera"),
            ),
            (
                template_name(Stage::Dockerfile),
                include_str!("../templates/dockerfile.tera"),
            ),
            (
                template_name(Stage::Documentation),
                include_str!("../templates/documentation.tera"),
            ),
            (
                template_name(Stage::ServerTemplate),
                include_str!("../templates/server_template.tera"),
            ),
            (
                FALLBACK_DOCUMENTATION,
                include_str!("../templates/fallback_documentation.tera"),
            ),
        ];

        for (name, source) in templates {
            tera.add_raw_template(name, source)
                .map_err(|e| Error::template(name, &e))?;
        }
        Ok(())
    }

    fn register_filters(tera: &mut Tera) {
        tera.register_filter("truncate_chars", Self::truncate_chars_filter);
    }

    /// Cuts a string to `max` characters and appends the truncation marker.
    fn truncate_chars_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let Some(text) = value.as_str() else {
            return Ok(value.clone());
        };
        let max = args
            .get("max")
            .and_then(Value::as_u64)
            .map_or(usize::MAX, |m| usize::try_from(m).unwrap_or(usize::MAX));

        let prefix = char_prefix(text, max);
        if prefix.len() == text.len() {
            Ok(value.clone())
        } else {
            Ok(Value::String(format!("{prefix}\n{TRUNCATION_MARKER}")))
        }
    }

    /// Renders the prompt pair for a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the context does not satisfy the template.
    pub(crate) fn render<T: Serialize>(&self, stage: Stage, ctx: &T) -> Result<Prompt> {
        Ok(Prompt {
            system: system_prompt(stage),
            user: self.render_template(template_name(stage), ctx)?,
        })
    }

    /// Renders the deterministic documentation.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub(crate) fn render_fallback_documentation(&self, ctx: &FallbackDocContext<'_>) -> Result<String> {
        self.render_template(FALLBACK_DOCUMENTATION, ctx)
    }

    fn render_template<T: Serialize>(&self, name: &str, ctx: &T) -> Result<String> {
        let mut context = Context::new();
        context.insert("ctx", ctx);

        self.tera
            .render(name, &context)
            .map_err(|e| Error::template(name, &e))
    }
}

const fn template_name(stage: Stage) -> &'static str {
    match stage {
        Stage::FileSelection => "file_selection",
        Stage::CodebaseAnalysis => "codebase_analysis",
        Stage::ToolGeneration => "tool_generation",
        Stage::Dockerfile => "dockerfile",
        Stage::Documentation => "documentation",
        Stage::ServerTemplate => "server_template",
    }
}

const fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::FileSelection => SELECTION_SYSTEM,
        Stage::CodebaseAnalysis => ANALYSIS_SYSTEM,
        Stage::ToolGeneration => TOOLS_SYSTEM,
        Stage::Dockerfile => DOCKERFILE_SYSTEM,
        Stage::Documentation => DOCUMENTATION_SYSTEM,
        Stage::ServerTemplate => SERVER_TEMPLATE_SYSTEM,
    }
}
