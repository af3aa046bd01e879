use crate::language::{FileType, Language};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A scored candidate file.
///
/// Created by the selector and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    /// Relative path inside the snapshot
    pub path: String,

    /// Content length in characters
    pub size: usize,

    /// Full file content
    #[serde(skip)]
    pub content: String,

    /// Detected language, if the extension is known
    pub language: Option<Language>,

    /// Heuristic importance score (always positive for selected files)
    pub importance_score: f64,

    /// Semantic role of the file
    pub file_type: FileType,
}

impl FileRecord {
    /// Returns the `path:content` entry fed to the truncator.
    #[must_use]
    pub fn to_entry(&self) -> String {
        format!("{}:{}", self.path, self.content)
    }
}

/// A repository snapshot: relative paths and their text content.
///
/// Enumeration order is preserved and breaks ties when ranking files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSnapshot {
    files: Vec<(String, String)>,
}

impl RepoSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file to the snapshot.
    pub fn push(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.push((path.into(), content.into()));
    }

    /// Returns the number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the snapshot has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over `(path, content)` pairs in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Looks up a file's content by exact path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
    }

    /// Returns the total content size in characters.
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.files.iter().map(|(_, c)| c.chars().count()).sum()
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for RepoSnapshot {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect(),
        }
    }
}

impl Serialize for RepoSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.files.iter().map(|(p, c)| (p, c)))
    }
}

impl<'de> Deserialize<'de> for RepoSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = RepoSnapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of file path to file content")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut snapshot = RepoSnapshot::new();
                while let Some((path, content)) = map.next_entry::<String, String>()? {
                    snapshot.push(path, content);
                }
                Ok(snapshot)
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}
