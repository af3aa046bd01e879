//! Path classification: programming language and semantic file type.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Filename fragments that mark a project configuration file.
///
/// Matched case-insensitively as substrings of the file name.
pub(crate) const CONFIG_FILE_NAMES: &[&str] = &[
    "package.json",
    "cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "composer.json",
    "dockerfile",
    "docker-compose.yml",
    ".env.example",
    "tsconfig.json",
    "webpack.config.js",
    "vite.config.js",
];

/// Path keywords that indicate request routing or handler code.
pub(crate) const API_KEYWORDS: &[&str] =
    &["routes", "api", "endpoints", "handlers", "controllers", "views"];

/// Path keywords that indicate data model or schema definitions.
pub(crate) const MODEL_KEYWORDS: &[&str] = &["models", "schema", "entities", "types", "structs"];

/// Programming language detected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// `.js`, `.mjs`, `.jsx`
    JavaScript,
    /// `.ts`, `.tsx`
    TypeScript,
    /// `.py`
    Python,
    /// `.rs`
    Rust,
    /// `.go`
    Go,
    /// `.java`
    Java,
    /// `.cpp`, `.cc`, `.cxx`
    Cpp,
    /// `.cs`
    CSharp,
    /// `.php`
    Php,
    /// `.rb`
    Ruby,
}

impl Language {
    /// Looks up a language by file extension (without the dot, any case).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "tsx" => Some(Self::TypeScript),
            "py" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            "cpp" | "cc" | "cxx" => Some(Self::Cpp),
            "cs" => Some(Self::CSharp),
            "php" => Some(Self::Php),
            "rb" => Some(Self::Ruby),
            _ => None,
        }
    }

    /// Returns the lowercase identifier used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Php => "php",
            Self::Ruby => "ruby",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic role of a file within the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Manifests, build files, container and environment files
    Config,
    /// Tests and specs
    Test,
    /// READMEs and markdown
    Docs,
    /// Routes, handlers, controllers
    Api,
    /// Models, schemas, entity definitions
    Model,
    /// Anything else
    Source,
}

impl FileType {
    /// Returns the identifier used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Api => "api",
            Self::Model => "model",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the language of a file from its extension.
///
/// Unknown or missing extensions yield `None`.
#[must_use]
pub fn classify(path: &str) -> Option<Language> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
}

/// Classifies the semantic role of a file.
///
/// Rules are checked in a fixed order and the first match wins:
/// config, test, docs, api, model, then source.
#[must_use]
pub fn file_type(path: &str) -> FileType {
    let name = file_name_lower(path);
    let path_lower = path.to_lowercase();

    if is_config_name(&name) {
        FileType::Config
    } else if is_test_path(&path_lower) {
        FileType::Test
    } else if name.starts_with("readme") || name.ends_with(".md") {
        FileType::Docs
    } else if contains_any(&path_lower, API_KEYWORDS) {
        FileType::Api
    } else if contains_any(&path_lower, MODEL_KEYWORDS) {
        FileType::Model
    } else {
        FileType::Source
    }
}

/// Returns the lowercased final path segment.
pub(crate) fn file_name_lower(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_lowercase()
}

pub(crate) fn is_config_name(name_lower: &str) -> bool {
    contains_any(name_lower, CONFIG_FILE_NAMES)
}

pub(crate) fn is_test_path(path_lower: &str) -> bool {
    path_lower.contains("test") || path_lower.contains("spec")
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
