use crate::{
    error::{Error, Result},
    file::RepoSnapshot,
    filter::{IgnoreFilter, normalize_path},
};
use ignore::{DirEntry, WalkBuilder};
use std::{fs, path::Path};
use tracing::{debug, instrument, trace, warn};

/// Default per-file size cap for the loader.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

const BINARY_PROBE_BYTES: usize = 8192;

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "gz", "tgz", "bz2", "xz",
    "7z", "rar", "tar", "jar", "war", "class", "exe", "dll", "so", "dylib", "o", "a", "lib",
    "bin", "wasm", "pyc", "pyo", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav",
    "avi", "mov", "sqlite", "db",
];

/// Counters collected while loading.
#[derive(Debug, Default, Clone)]
struct LoadStats {
    text_files: usize,
    binary_files: usize,
    oversized_files: usize,
    ignored_files: usize,
    errors: usize,
}

fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.iter().any(|b| ext.eq_ignore_ascii_case(b)))
}

fn has_null_byte(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(BINARY_PROBE_BYTES)];
    memchr::memchr(0, probe).is_some()
}

/// Loads a directory into a [`RepoSnapshot`].
///
/// `.gitignore` files are honoured, hidden files are skipped, and the
/// `filter` is applied to every relative path. Binary files (by extension
/// or by a null byte near the start) and files larger than
/// `max_file_bytes` are left out. Files that are not valid UTF-8 are skipped
/// with a warning. The snapshot is sorted by path.
///
/// # Errors
///
/// Returns [`Error::NoFiles`] if no file survives.
#[instrument(skip(filter))]
pub fn load_snapshot(root: &Path, filter: &IgnoreFilter, max_file_bytes: u64) -> Result<RepoSnapshot> {
    let mut stats = LoadStats::default();
    let mut files: Vec<(String, String)> = Vec::new();

    let walker = WalkBuilder::new(root)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .hidden(true)
        .follow_links(false)
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Walk error: {e}");
                stats.errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        match load_entry(&entry, root, filter, max_file_bytes, &mut stats) {
            Ok(Some(file)) => files.push(file),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to load {}: {e}", entry.path().display());
                stats.errors += 1;
            }
        }
    }

    debug!(
        "Load complete: {} text, {} binary, {} oversized, {} ignored, {} errors",
        stats.text_files,
        stats.binary_files,
        stats.oversized_files,
        stats.ignored_files,
        stats.errors
    );

    if files.is_empty() {
        return Err(Error::no_files(root));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().collect())
}

fn load_entry(
    entry: &DirEntry,
    root: &Path,
    filter: &IgnoreFilter,
    max_file_bytes: u64,
    stats: &mut LoadStats,
) -> Result<Option<(String, String)>> {
    let path = entry.path();
    let relative = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let relative = normalize_path(&relative.to_string_lossy());

    if filter.is_ignored(&relative) {
        trace!("Ignoring {relative}");
        stats.ignored_files += 1;
        return Ok(None);
    }

    if has_binary_extension(path) {
        debug!("Skipping binary file (by extension): {relative}");
        stats.binary_files += 1;
        return Ok(None);
    }

    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if metadata.len() > max_file_bytes {
        debug!("Skipping {relative}: {} bytes over the cap", metadata.len());
        stats.oversized_files += 1;
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    if has_null_byte(&bytes) {
        debug!("Skipping binary file (by content): {relative}");
        stats.binary_files += 1;
        return Ok(None);
    }

    let Ok(content) = String::from_utf8(bytes) else {
        warn!("{}", Error::invalid_utf8(path));
        stats.errors += 1;
        return Ok(None);
    };

    stats.text_files += 1;
    Ok(Some((relative, content)))
}
