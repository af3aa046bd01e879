//! Key-file selection.

use crate::file::{FileRecord, RepoSnapshot};
use crate::filter::IgnoreFilter;
use crate::language::{classify, file_type};
use crate::score::score;
use tracing::{debug, trace};

/// Default number of key files kept.
pub const DEFAULT_MAX_KEY_FILES: usize = 15;

/// Ranks snapshot files by importance and keeps the top `max_files`.
///
/// Ignored and non-positive files are dropped. The sort is stable, so equal
/// scores keep snapshot enumeration order.
#[must_use]
pub fn select_key_files(
    snapshot: &RepoSnapshot,
    filter: &IgnoreFilter,
    max_files: usize,
) -> Vec<FileRecord> {
    let mut candidates: Vec<FileRecord> = snapshot
        .iter()
        .filter(|(path, _)| !filter.is_ignored(path))
        .filter_map(|(path, content)| {
            let importance_score = score(path, content);
            if importance_score <= 0.0 {
                trace!("Dropping {path} (score {importance_score})");
                return None;
            }
            Some(FileRecord {
                path: path.to_string(),
                size: content.chars().count(),
                content: content.to_string(),
                language: classify(path),
                importance_score,
                file_type: file_type(path),
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.importance_score.total_cmp(&a.importance_score));
    candidates.truncate(max_files);

    debug!(
        "Selected {} key files from {} candidates",
        candidates.len(),
        snapshot.len()
    );
    candidates
}

/// Resolves an explicit path list against the snapshot.
///
/// Unknown and ignored paths are skipped; duplicates keep their first
/// position. Scores are still computed so downstream views stay uniform.
#[must_use]
pub fn records_for_paths<S: AsRef<str>>(
    snapshot: &RepoSnapshot,
    filter: &IgnoreFilter,
    paths: &[S],
    max_files: usize,
) -> Vec<FileRecord> {
    let mut records: Vec<FileRecord> = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if records.len() >= max_files {
            break;
        }
        if filter.is_ignored(path) || records.iter().any(|r| r.path == path) {
            continue;
        }
        let Some(content) = snapshot.get(path) else {
            debug!("Requested path '{path}' is not in the snapshot");
            continue;
        };
        records.push(FileRecord {
            path: path.to_string(),
            size: content.chars().count(),
            content: content.to_string(),
            language: classify(path),
            importance_score: score(path, content),
            file_type: file_type(path),
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BODY: &str = "plain words with nothing special in them at all, long enough";

    #[test]
    fn test_empty_snapshot_selects_nothing() {
        let selected = select_key_files(&RepoSnapshot::new(), &IgnoreFilter::default(), 15);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_ranking_and_limit() {
        let snapshot: RepoSnapshot = vec![
            ("notes/todo.txt", BODY),
            ("README.md", BODY),
            ("package.json", BODY),
            ("src/api/users.txt", BODY),
        ]
        .into_iter()
        .collect();

        let selected = select_key_files(&snapshot, &IgnoreFilter::default(), 2);
        let paths: Vec<_> = selected.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["package.json", "src/api/users.txt"]);
    }

    #[test]
    fn test_zero_scores_are_dropped() {
        let snapshot: RepoSnapshot = vec![("notes/todo.txt", BODY)].into_iter().collect();
        assert!(select_key_files(&snapshot, &IgnoreFilter::default(), 15).is_empty());
    }

    #[test]
    fn test_ties_keep_enumeration_order() {
        let snapshot: RepoSnapshot = vec![
            ("docs/b/README.md", BODY),
            ("docs/a/README.md", BODY),
            ("README.md", BODY),
        ]
        .into_iter()
        .collect();

        let selected = select_key_files(&snapshot, &IgnoreFilter::default(), 15);
        let paths: Vec<_> = selected.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/b/README.md", "docs/a/README.md", "README.md"]);
    }

    #[test]
    fn test_ignored_files_are_not_selected() {
        let snapshot: RepoSnapshot = vec![
            ("node_modules/lodash/index.js", "module.exports = function () {}"),
            ("src/index.js", "module.exports = function () {}"),
        ]
        .into_iter()
        .collect();

        let selected = select_key_files(&snapshot, &IgnoreFilter::default(), 15);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, "src/index.js");
    }

    #[test]
    fn test_record_fields() {
        let snapshot: RepoSnapshot = vec![("src/routes/users.ts", BODY)].into_iter().collect();
        let selected = select_key_files(&snapshot, &IgnoreFilter::default(), 15);
        let record = &selected[0];
        assert_eq!(record.size, BODY.chars().count());
        assert_eq!(record.language, Some(crate::language::Language::TypeScript));
        assert_eq!(record.file_type, crate::language::FileType::Api);
        assert!(record.importance_score > 0.0);
    }

    #[test]
    fn test_records_for_paths() {
        let snapshot: RepoSnapshot = vec![
            ("a.py", "x = 1"),
            ("b.py", "y = 2"),
            ("node_modules/c.js", "z"),
        ]
        .into_iter()
        .collect();

        let records = records_for_paths(
            &snapshot,
            &IgnoreFilter::default(),
            &["b.py", "missing.py", "b.py", "node_modules/c.js", "a.py"],
            15,
        );
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["b.py", "a.py"]);

        let limited = records_for_paths(&snapshot, &IgnoreFilter::default(), &["a.py", "b.py"], 1);
        assert_eq!(limited.len(), 1);
    }

    fn arb_snapshot() -> impl Strategy<Value = Vec<(String, String)>> {
        let dirs = prop::sample::select(vec!["", "src/", "api/", "models/", "tests/", "node_modules/"]);
        let names = prop::sample::select(vec![
            "main.rs", "index.js", "README.md", "package.json", "util.py", "notes.txt",
        ]);
        let bodies = prop::sample::select(vec![
            "x",
            "import os\ndef main():\n    pass\n",
            "plain prose without any keywords in it, but long enough to count",
        ]);
        prop::collection::vec((dirs, names, bodies), 0..20).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (d, n, b))| (format!("{d}{i}/{n}"), b.to_string()))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_selection_bounds_and_order(files in arb_snapshot(), max in 0usize..10) {
            let snapshot: RepoSnapshot = files.clone().into_iter().collect();
            let selected = select_key_files(&snapshot, &IgnoreFilter::default(), max);

            prop_assert!(selected.len() <= max);
            for record in &selected {
                prop_assert!(record.importance_score > 0.0);
                prop_assert!(files.iter().any(|(p, _)| *p == record.path));
            }
            for pair in selected.windows(2) {
                prop_assert!(pair[0].importance_score >= pair[1].importance_score);
            }
        }
    }
}
