//! Heuristic project signals derived from key files.
//!
//! These feed the analysis prompt and the deterministic fallbacks used when
//! a completion cannot be used.

use crate::file::FileRecord;
use crate::language::{CONFIG_FILE_NAMES, FileType, Language, file_name_lower};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

/// Coarse project category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    /// Browser application
    WebFrontend,
    /// HTTP service
    WebBackend,
    /// Both frontend and backend indicators present
    Fullstack,
    /// Mobile application
    Mobile,
    /// Command-line tool
    Cli,
    /// Reusable library
    Library,
    /// Data analysis or machine learning
    DataScience,
    /// Nothing scored
    Unknown,
}

impl ProjectType {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebFrontend => "web_frontend",
            Self::WebBackend => "web_backend",
            Self::Fullstack => "fullstack",
            Self::Mobile => "mobile",
            Self::Cli => "cli",
            Self::Library => "library",
            Self::DataScience => "data_science",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Web framework detected from file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Framework {
    /// Express.js
    #[serde(rename = "Express.js")]
    Express,
    /// FastAPI
    #[serde(rename = "FastAPI")]
    FastApi,
    /// Django
    Django,
    /// Flask
    Flask,
    /// Next.js
    #[serde(rename = "Next.js")]
    NextJs,
    /// React
    React,
}

impl Framework {
    /// Returns the display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Express => "Express.js",
            Self::FastApi => "FastAPI",
            Self::Django => "Django",
            Self::Flask => "Flask",
            Self::NextJs => "Next.js",
            Self::React => "React",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP route found by pattern matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Uppercase HTTP method
    pub method: String,
    /// Route path as written in the source
    pub path: String,
    /// File the route was found in
    pub file: String,
    /// Framework detected in that file
    pub framework: Option<Framework>,
}

// (pattern, method group, path group)
static ROUTE_PATTERNS: Lazy<Vec<(Regex, usize, usize)>> = Lazy::new(|| {
    [
        (
            r#"(?i)(?:app|router)\.(get|post|put|delete|patch)\s*\(\s*['"`]([^'"`]+)['"`]"#,
            1,
            2,
        ),
        (
            r#"(?i)\.route\s*\(\s*['"`]([^'"`]+)['"`]\s*\)\s*\.(get|post|put|delete|patch)"#,
            2,
            1,
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, method, path)| Regex::new(pattern).ok().map(|re| (re, method, path)))
    .collect()
});

const FRONTEND_TERMS: &[&str] = &["react", "vue", "angular", "dom", "document."];
const BACKEND_TERMS: &[&str] = &["express", "fastapi", "django", "flask", "gin", "echo"];
const MOBILE_TERMS: &[&str] = &["react-native", "flutter", "android", "ios"];
const CLI_TERMS: &[&str] = &["argparse", "cobra", "clap", "commander"];
const LIBRARY_TERMS: &[&str] = &["export", "module.exports"];
const DATA_SCIENCE_TERMS: &[&str] = &["pandas", "numpy", "scikit", "tensorflow", "pytorch"];

fn mentions(content_lower: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| content_lower.contains(t))
}

/// Guesses the project category by counting indicator terms.
///
/// Ties go to the category listed first; `Unknown` when nothing scores.
#[must_use]
pub fn detect_project_type(key_files: &[FileRecord]) -> ProjectType {
    let (mut frontend, mut backend, mut mobile, mut cli, mut library, mut data) =
        (0u32, 0u32, 0u32, 0u32, 0u32, 0u32);

    for file in key_files {
        let content = file.content.to_lowercase();
        let path = file.path.to_lowercase();

        if mentions(&content, FRONTEND_TERMS) {
            frontend += 2;
        }
        if mentions(&content, BACKEND_TERMS) {
            backend += 2;
        }
        if mentions(&content, MOBILE_TERMS) {
            mobile += 3;
        }
        if mentions(&content, CLI_TERMS) {
            cli += 2;
        }
        if path.contains("lib") || mentions(&content, LIBRARY_TERMS) {
            library += 1;
        }
        if mentions(&content, DATA_SCIENCE_TERMS) {
            data += 3;
        }
    }

    let fullstack = if frontend > 0 && backend > 0 {
        frontend + backend
    } else {
        0
    };

    let ranked = [
        (ProjectType::WebFrontend, frontend),
        (ProjectType::WebBackend, backend),
        (ProjectType::Fullstack, fullstack),
        (ProjectType::Mobile, mobile),
        (ProjectType::Cli, cli),
        (ProjectType::Library, library),
        (ProjectType::DataScience, data),
    ];

    let mut best = (ProjectType::Unknown, 0);
    for (kind, points) in ranked {
        if points > best.1 {
            best = (kind, points);
        }
    }
    best.0
}

/// Detects a web framework from file content. First match wins.
#[must_use]
pub fn detect_framework(content: &str) -> Option<Framework> {
    let lower = content.to_lowercase();
    if lower.contains("express") {
        Some(Framework::Express)
    } else if lower.contains("fastapi") {
        Some(Framework::FastApi)
    } else if lower.contains("django") {
        Some(Framework::Django)
    } else if lower.contains("flask") {
        Some(Framework::Flask)
    } else if lower.contains("next/") || lower.contains("\"next\"") {
        Some(Framework::NextJs)
    } else if lower.contains("react") {
        Some(Framework::React)
    } else {
        None
    }
}

/// Distinct frameworks across the key files, in name order.
#[must_use]
pub fn detect_frameworks(key_files: &[FileRecord]) -> BTreeSet<Framework> {
    key_files
        .iter()
        .filter_map(|f| detect_framework(&f.content))
        .collect()
}

/// Scans API files for route declarations.
///
/// Only files classified as API, or with `api` in their path, are scanned.
/// Duplicate `(method, path, file)` triples are reported once.
#[must_use]
pub fn extract_endpoints(key_files: &[FileRecord]) -> Vec<Endpoint> {
    let mut endpoints: Vec<Endpoint> = Vec::new();

    for file in key_files {
        if file.file_type != FileType::Api && !file.path.to_lowercase().contains("api") {
            continue;
        }
        let framework = detect_framework(&file.content);

        for (re, method_group, path_group) in ROUTE_PATTERNS.iter() {
            for caps in re.captures_iter(&file.content) {
                let (Some(method), Some(path)) = (caps.get(*method_group), caps.get(*path_group))
                else {
                    continue;
                };
                let endpoint = Endpoint {
                    method: method.as_str().to_uppercase(),
                    path: path.as_str().to_string(),
                    file: file.path.clone(),
                    framework,
                };
                if !endpoints.contains(&endpoint) {
                    endpoints.push(endpoint);
                }
            }
        }
    }

    endpoints
}

/// Canonical config file names present among the given paths.
#[must_use]
pub fn config_files<'a>(paths: impl IntoIterator<Item = &'a str>) -> BTreeSet<&'static str> {
    let mut found = BTreeSet::new();
    for path in paths {
        let name = file_name_lower(path);
        for known in CONFIG_FILE_NAMES {
            if name.contains(known) {
                found.insert(*known);
            }
        }
    }
    found
}

/// Deterministic tool list used when tool generation fails.
///
/// Always includes a project-structure tool; adds language, container and
/// endpoint tools as the signals warrant.
#[must_use]
pub fn fallback_tools(
    languages: &BTreeSet<Language>,
    configs: &BTreeSet<&str>,
    endpoints: &[Endpoint],
    project_type: ProjectType,
) -> Vec<Value> {
    let names: Vec<&str> = languages.iter().map(|l| l.as_str()).collect();
    let mut tools = vec![json!({
        "name": "analyze-project-structure",
        "title": "Analyze Project Structure",
        "description": format!("Analyze {} project structure", names.join(", ")),
        "input_schema": {},
        "category": "development",
        "purpose": "Get project overview from tree structure",
    })];

    if !endpoints.is_empty() {
        tools.push(json!({
            "name": "test-api-endpoint",
            "title": "Test API Endpoint",
            "description": "Test any API endpoint in this project",
            "input_schema": {"method": "string", "path": "string", "body": "string"},
            "category": "api",
            "purpose": "Quickly test API endpoints",
        }));
    }

    if languages.contains(&Language::JavaScript) || languages.contains(&Language::TypeScript) {
        tools.push(json!({
            "name": "run-npm-commands",
            "title": "Run npm Commands",
            "description": "Execute npm scripts and commands",
            "input_schema": {"script": "string"},
            "category": "development",
            "purpose": "Build, test, or run the Node.js project",
        }));
    }

    if languages.contains(&Language::Rust) {
        tools.push(json!({
            "name": "run-cargo-commands",
            "title": "Run Cargo Commands",
            "description": "Execute Rust cargo commands",
            "input_schema": {"command": "string"},
            "category": "development",
            "purpose": "Build, test, or run the Rust project",
        }));
    }

    if languages.contains(&Language::Python) {
        tools.push(json!({
            "name": "run-python-tools",
            "title": "Run Python Tools",
            "description": "Execute Python project tools",
            "input_schema": {"tool": "string"},
            "category": "development",
            "purpose": "Run tests, linting, or other Python tools",
        }));
    }

    if matches!(project_type, ProjectType::WebFrontend | ProjectType::Fullstack) {
        tools.push(json!({
            "name": "build-project",
            "title": "Build Project",
            "description": "Build the frontend project",
            "input_schema": {"environment": "string"},
            "category": "development",
            "purpose": "Build the project for deployment",
        }));
    }

    if configs.contains("dockerfile") {
        tools.push(json!({
            "name": "docker-operations",
            "title": "Docker Operations",
            "description": "Build and manage Docker containers",
            "input_schema": {"action": "string"},
            "category": "development",
            "purpose": "Build, run, or manage Docker containers",
        }));
    }

    tools
}

const NODE_DOCKERFILE: &str = r#"FROM node:18-alpine
WORKDIR /app
COPY package*.json ./
RUN npm ci --only=production
COPY . .
EXPOSE 3000
CMD ["npm", "start"]"#;

const RUST_DOCKERFILE: &str = r#"FROM rust:1.70 as builder
WORKDIR /usr/src/app
COPY . .
RUN cargo build --release

FROM debian:bullseye-slim
RUN apt-get update && apt-get install -y ca-certificates && rm -rf /var/lib/apt/lists/*
COPY --from=builder /usr/src/app/target/release/* /usr/local/bin/
CMD ["./app"]"#;

const PYTHON_DOCKERFILE: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY requirements.txt* pyproject.toml* ./
RUN pip install -r requirements.txt || pip install -e . || echo "No requirements found"
COPY . .
EXPOSE 8000
CMD ["python", "-m", "app"]"#;

const GENERIC_DOCKERFILE: &str = r#"FROM alpine:latest
WORKDIR /app
COPY . .
EXPOSE 8080
CMD ["echo", "configure the entrypoint for this image"]"#;

/// Canned Dockerfile chosen by ecosystem manifest and language.
#[must_use]
pub fn fallback_dockerfile(languages: &BTreeSet<Language>, configs: &BTreeSet<&str>) -> &'static str {
    let js = languages.contains(&Language::JavaScript) || languages.contains(&Language::TypeScript);

    if configs.contains("package.json") && js {
        NODE_DOCKERFILE
    } else if configs.contains("cargo.toml") && languages.contains(&Language::Rust) {
        RUST_DOCKERFILE
    } else if (configs.contains("pyproject.toml") || configs.contains("requirements.txt"))
        && languages.contains(&Language::Python)
    {
        PYTHON_DOCKERFILE
    } else {
        GENERIC_DOCKERFILE
    }
}

/// Minimal tool-server files used when the completion cannot be used.
///
/// Keys are file names. `dockerfile` is shipped as the server's `Dockerfile`.
#[must_use]
pub fn fallback_server_template(
    project_name: &str,
    tools: &[Value],
    dockerfile: &str,
) -> BTreeMap<String, String> {
    let slug: String = project_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let package = json!({
        "name": format!("{}-tool-server", slug.trim_matches('-')),
        "version": "1.0.0",
        "type": "module",
        "scripts": {
            "build": "tsc",
            "start": "node dist/server.js"
        },
        "dependencies": {
            "@modelcontextprotocol/sdk": "^0.5.0"
        },
        "devDependencies": {
            "typescript": "^5.0.0"
        }
    });

    let mut server = format!(
        "// Basic tool server for {project_name}\n\
         import {{ McpServer }} from '@modelcontextprotocol/sdk/server/mcp.js';\n\n\
         const server = new McpServer({{ name: {}, version: '1.0.0' }});\n\n",
        Value::from(project_name)
    );
    for name in tools.iter().filter_map(|t| t.get("name").and_then(Value::as_str)) {
        let _ = writeln!(server, "// tool: {name}");
    }
    server.push_str("\nconsole.log('Tool server starting...');\n");

    BTreeMap::from([
        ("package.json".to_string(), format!("{package:#}")),
        ("server.ts".to_string(), server),
        ("Dockerfile".to_string(), dockerfile.to_string()),
        (
            "README.md".to_string(),
            format!(
                "# {project_name} Tool Server\n\nGenerated server with {} tools.\n",
                tools.len()
            ),
        ),
    ])
}
