//! Importance scoring.
//!
//! The score is computed by an ordered list of [`ScoreStep`]s. Order is
//! significant: path bonuses first, then the two size multipliers, then
//! the two content bonuses. Reordering changes the final scores.

use crate::language::{
    API_KEYWORDS, MODEL_KEYWORDS, contains_any, file_name_lower, is_config_name, is_test_path,
};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Content longer than this many characters is penalized.
pub const LARGE_FILE_CHARS: usize = 10_000;
/// Content shorter than this many characters is penalized.
pub const SMALL_FILE_CHARS: usize = 50;
/// Number of leading characters inspected by the content bonuses.
pub const CONTENT_PROBE_CHARS: usize = 1_000;

const ENTRY_POINT_GLOBS: &[&str] = &[
    "**/main.*",
    "**/index.*",
    "**/app.*",
    "**/server.*",
    "src/main.*",
    "src/index.*",
];

static ENTRY_POINTS: Lazy<Option<GlobSet>> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in ENTRY_POINT_GLOBS {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .ok()?;
        builder.add(glob);
    }
    builder.build().ok()
});

static IMPORT_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(import|export|require|from\s+\w+)").ok());

static DEFINITION_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(function|class|def|fn\s+\w+|func\s+\w+)").ok());

/// One transform in the scoring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStep {
    /// +10.0 for a known configuration file name
    ConfigFile,
    /// +8.0 for an entry-point path
    EntryPoint,
    /// +7.0 for an API path keyword
    ApiPath,
    /// +6.0 for a model/schema path keyword
    ModelPath,
    /// +5.0 for a README
    Readme,
    /// +2.0 for a test or spec path
    TestPath,
    /// x0.5 for content over [`LARGE_FILE_CHARS`]
    LargeFilePenalty,
    /// x0.3 for content under [`SMALL_FILE_CHARS`]
    SmallFilePenalty,
    /// +2.0 when the probe window has import/export statements
    ImportBonus,
    /// +1.5 when the probe window has function or class definitions
    DefinitionBonus,
}

/// How a step changes the running score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Add to the running score
    Add(f64),
    /// Multiply the running score
    Multiply(f64),
}

impl ScoreStep {
    /// All steps in evaluation order.
    pub const PIPELINE: [Self; 10] = [
        Self::ConfigFile,
        Self::EntryPoint,
        Self::ApiPath,
        Self::ModelPath,
        Self::Readme,
        Self::TestPath,
        Self::LargeFilePenalty,
        Self::SmallFilePenalty,
        Self::ImportBonus,
        Self::DefinitionBonus,
    ];

    /// Returns the adjustment applied when the step matches.
    #[must_use]
    pub const fn adjustment(self) -> Adjustment {
        match self {
            Self::ConfigFile => Adjustment::Add(10.0),
            Self::EntryPoint => Adjustment::Add(8.0),
            Self::ApiPath => Adjustment::Add(7.0),
            Self::ModelPath => Adjustment::Add(6.0),
            Self::Readme => Adjustment::Add(5.0),
            Self::TestPath | Self::ImportBonus => Adjustment::Add(2.0),
            Self::LargeFilePenalty => Adjustment::Multiply(0.5),
            Self::SmallFilePenalty => Adjustment::Multiply(0.3),
            Self::DefinitionBonus => Adjustment::Add(1.5),
        }
    }

    /// Returns true if the step applies to the given file.
    #[must_use]
    pub fn matches(self, input: &ScoreInput<'_>) -> bool {
        match self {
            Self::ConfigFile => is_config_name(&input.name_lower),
            Self::EntryPoint => is_entry_point(input.path),
            Self::ApiPath => contains_any(&input.path_lower, API_KEYWORDS),
            Self::ModelPath => contains_any(&input.path_lower, MODEL_KEYWORDS),
            Self::Readme => input.name_lower.starts_with("readme"),
            Self::TestPath => is_test_path(&input.path_lower),
            Self::LargeFilePenalty => input.char_len > LARGE_FILE_CHARS,
            Self::SmallFilePenalty => input.char_len < SMALL_FILE_CHARS,
            Self::ImportBonus => pattern_matches(&IMPORT_PATTERN, input.probe),
            Self::DefinitionBonus => pattern_matches(&DEFINITION_PATTERN, input.probe),
        }
    }

    /// Applies the step's adjustment to a running score.
    #[must_use]
    pub fn apply(self, score: f64) -> f64 {
        match self.adjustment() {
            Adjustment::Add(bonus) => score + bonus,
            Adjustment::Multiply(factor) => score * factor,
        }
    }
}

/// Precomputed view of a file used by every step.
#[derive(Debug, Clone)]
pub struct ScoreInput<'a> {
    path: &'a str,
    path_lower: String,
    name_lower: String,
    char_len: usize,
    probe: &'a str,
}

impl<'a> ScoreInput<'a> {
    /// Prepares a file for scoring.
    #[must_use]
    pub fn new(path: &'a str, content: &'a str) -> Self {
        let probe = match content.char_indices().nth(CONTENT_PROBE_CHARS) {
            Some((idx, _)) => &content[..idx],
            None => content,
        };
        Self {
            path,
            path_lower: path.to_lowercase(),
            name_lower: file_name_lower(path),
            char_len: content.chars().count(),
            probe,
        }
    }
}

/// Score plus the steps that fired, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Final score
    pub score: f64,
    /// Steps that matched, in evaluation order
    pub applied: Vec<ScoreStep>,
}

/// Computes the importance score of a file.
#[must_use]
pub fn score(path: &str, content: &str) -> f64 {
    explain(path, content).score
}

/// Computes the importance score and records which steps fired.
#[must_use]
pub fn explain(path: &str, content: &str) -> ScoreBreakdown {
    let input = ScoreInput::new(path, content);
    let mut score = 0.0;
    let mut applied = Vec::new();

    for step in ScoreStep::PIPELINE {
        if step.matches(&input) {
            score = step.apply(score);
            applied.push(step);
        }
    }

    ScoreBreakdown { score, applied }
}

fn is_entry_point(path: &str) -> bool {
    ENTRY_POINTS
        .as_ref()
        .is_some_and(|set| set.is_match(path))
}

fn pattern_matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_small_manifest_scores_config_times_penalty() {
        // 18 chars, no import/definition keywords
        let breakdown = explain("package.json", r#"{"name": "widget"}"#);
        assert_eq!(
            breakdown.applied,
            vec![ScoreStep::ConfigFile, ScoreStep::SmallFilePenalty]
        );
        assert!(approx(breakdown.score, 3.0));
    }

    #[test]
    fn test_entry_point_detection() {
        assert!(is_entry_point("main.py"));
        assert!(is_entry_point("src/index.ts"));
        assert!(is_entry_point("cmd/api/server.go"));
        assert!(is_entry_point("App.jsx"));
        assert!(!is_entry_point("src/domain.py"));
        assert!(!is_entry_point("src/main.d/notes.txt"));
    }

    #[test]
    fn test_bonuses_accumulate_before_penalties() {
        // api + entry point, tiny content: (8 + 7) * 0.3
        let s = score("api/index.txt", "ok");
        assert!(approx(s, 4.5));
    }

    #[test]
    fn test_content_bonuses_added_after_penalties() {
        // source file with a definition, 30 chars: 0 * 0.3 + 1.5
        let content = "fn helper() -> u8 { 42 }      ";
        assert_eq!(content.chars().count(), 30);
        let breakdown = explain("src/util.rs", content);
        assert_eq!(
            breakdown.applied,
            vec![ScoreStep::SmallFilePenalty, ScoreStep::DefinitionBonus]
        );
        assert!(approx(breakdown.score, 1.5));
    }

    #[test]
    fn test_large_file_penalty() {
        let mut content = String::from("import os\n");
        content.push_str(&"x = 1\n".repeat(2_000));
        assert!(content.chars().count() > LARGE_FILE_CHARS);

        // models keyword: 6 * 0.5 + 2 (import)
        let s = score("app/models/user.py", &content);
        assert!(approx(s, 5.0));
    }

    #[test]
    fn test_probe_window_limits_content_bonuses() {
        let mut content = "x".repeat(CONTENT_PROBE_CHARS);
        content.push_str("\nimport os\ndef main(): pass\n");
        let s = score("scripts/tool.txt", &content);
        assert!(approx(s, 0.0));
    }

    #[test]
    fn test_readme_and_test_bonuses() {
        let body = "# Project\n\nSome words about the project that are long enough.";
        let breakdown = explain("README.md", body);
        assert_eq!(breakdown.applied, vec![ScoreStep::Readme]);
        assert!(approx(breakdown.score, 5.0));

        let breakdown = explain("tests/test_app.txt", body);
        assert_eq!(breakdown.applied, vec![ScoreStep::TestPath]);
    }

    #[test]
    fn test_unremarkable_file_scores_zero() {
        let content = "lorem ipsum dolor sit amet, consectetur adipiscing elit";
        assert!(approx(score("notes/todo.txt", content), 0.0));
    }

    #[test]
    fn test_pipeline_order_is_fixed() {
        let position = |step| ScoreStep::PIPELINE.iter().position(|s| *s == step);
        assert!(position(ScoreStep::TestPath) < position(ScoreStep::LargeFilePenalty));
        assert!(position(ScoreStep::SmallFilePenalty) < position(ScoreStep::ImportBonus));
        assert_eq!(ScoreStep::PIPELINE.len(), 10);
    }

    #[test]
    fn test_step_apply() {
        assert!(approx(ScoreStep::ConfigFile.apply(1.0), 11.0));
        assert!(approx(ScoreStep::LargeFilePenalty.apply(10.0), 5.0));
        assert!(approx(ScoreStep::SmallFilePenalty.apply(10.0), 3.0));
    }
}
