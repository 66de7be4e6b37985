//! Expanding a pattern against a directory tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::matcher::matches;
use crate::parse::{Pattern, Segment, WildKind};

/// Errors from filesystem access during expansion.
#[derive(Debug, Error)]
pub enum GlobError {
    #[error("cannot read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// One directory entry as seen by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobEntry {
    pub name: String,
    pub is_dir: bool,
}

impl GlobEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_dir: false }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_dir: true }
    }
}

/// Minimal read-only filesystem used by [`expand`].
#[async_trait]
pub trait GlobFs: Send + Sync {
    /// List a directory. A missing directory is an empty listing, not an error.
    async fn list_dir(&self, dir: &Path) -> Result<Vec<GlobEntry>, GlobError>;

    async fn exists(&self, path: &Path) -> bool;
}

/// The process filesystem, relative paths resolved against the current directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

#[async_trait]
impl GlobFs for RealFs {
    async fn list_dir(&self, dir: &Path) -> Result<Vec<GlobEntry>, GlobError> {
        let io_err = |e: std::io::Error| GlobError::Io {
            path: dir.to_path_buf(),
            message: e.to_string(),
        };
        let mut rd = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };
        let mut entries = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(io_err)? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(GlobEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// Expand `pattern` into the sorted list of matching paths.
///
/// Results are spelled the way the pattern is: relative patterns yield
/// relative paths, absolute ones absolute paths. A pattern without any
/// wildcard yields itself if the path exists.
pub async fn expand<F: GlobFs + ?Sized>(pattern: &Pattern, fs: &F) -> Result<Vec<String>, GlobError> {
    if !pattern.has_wildcard() {
        let text = literal_text(&pattern.segments);
        let found = !text.is_empty() && fs.exists(Path::new(&text)).await;
        return Ok(if found { vec![text] } else { Vec::new() });
    }

    // Leading components without wildcards name the directory to walk from.
    let mut base_len = 0;
    let mut i = 0;
    while i < pattern.segments.len() {
        match &pattern.segments[i] {
            Segment::Slash => base_len = i + 1,
            Segment::Wild(_) => break,
            Segment::Literal(_) => {}
        }
        i += 1;
    }
    let base = literal_text(&pattern.segments[..base_len]);
    let rest = &pattern.segments[base_len..];

    let recursive = rest.iter().any(|s| matches!(s, Segment::Wild(WildKind::StarStar)));
    let depth_limit = rest.iter().filter(|s| matches!(s, Segment::Slash)).count() + 1;
    // Wildcards never match a leading `.`, so hidden directories are only
    // worth entering when a literal component asks for one.
    let wants_hidden = rest.iter().enumerate().any(|(i, s)| {
        let starts_component = i == 0 || matches!(rest[i - 1], Segment::Slash);
        starts_component && matches!(s, Segment::Literal(l) if l.starts_with('.'))
    });

    let mut found = Vec::new();
    let mut pending = vec![(base.clone(), 1usize)];
    while let Some((prefix, depth)) = pending.pop() {
        let dir = if prefix.is_empty() { PathBuf::from(".") } else { PathBuf::from(&prefix) };
        let entries = match fs.list_dir(&dir).await {
            Ok(entries) => entries,
            // Unreadable directories below the base are skipped; the base itself must be readable.
            Err(_) if depth > 1 => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let path = format!("{prefix}{}", entry.name);
            if matches(pattern, &path) {
                found.push(path.clone());
            } else if entry.is_dir && matches(pattern, &format!("{path}/")) {
                found.push(format!("{path}/"));
            }
            let hidden = entry.name.starts_with('.');
            if entry.is_dir && (recursive || depth < depth_limit) && (!hidden || wants_hidden) {
                pending.push((format!("{path}/"), depth + 1));
            }
        }
    }

    found.sort();
    Ok(found)
}

fn literal_text(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Literal(s) => out.push_str(s),
            Segment::Slash => out.push('/'),
            Segment::Wild(_) => {}
        }
    }
    out
}
