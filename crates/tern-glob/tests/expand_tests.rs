//! Expansion against an in-memory tree and the real filesystem.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tern_glob::{expand, GlobEntry, GlobError, GlobFs, Pattern, RealFs};

/// Directory listing keyed by normalized directory path ("." is the root).
struct MemFs {
    dirs: BTreeMap<String, Vec<GlobEntry>>,
}

impl MemFs {
    fn new(files: &[&str]) -> Self {
        let mut dirs: BTreeMap<String, Vec<GlobEntry>> = BTreeMap::new();
        for file in files {
            let parts: Vec<&str> = file.split('/').collect();
            for (i, part) in parts.iter().enumerate() {
                let parent = if i == 0 { ".".to_string() } else { parts[..i].join("/") };
                let is_dir = i + 1 < parts.len();
                let listing = dirs.entry(parent).or_default();
                if !listing.iter().any(|e| e.name == *part) {
                    listing.push(GlobEntry { name: part.to_string(), is_dir });
                }
            }
        }
        Self { dirs }
    }

    fn key(path: &Path) -> String {
        let s = path.to_string_lossy();
        let trimmed = s.trim_end_matches('/');
        if trimmed.is_empty() { ".".to_string() } else { trimmed.to_string() }
    }
}

#[async_trait]
impl GlobFs for MemFs {
    async fn list_dir(&self, dir: &Path) -> Result<Vec<GlobEntry>, GlobError> {
        Ok(self.dirs.get(&Self::key(dir)).cloned().unwrap_or_default())
    }

    async fn exists(&self, path: &Path) -> bool {
        let key = Self::key(path);
        self.dirs.contains_key(&key) || self.dirs.values().flatten().any(|e| e.name == key)
    }
}

fn tree() -> MemFs {
    MemFs::new(&[
        "Cargo.toml",
        "README.md",
        ".env",
        "src/lib.rs",
        "src/main.rs",
        "src/parse/mod.rs",
        "src/parse/.cache/x.rs",
        "tests/a_tests.rs",
    ])
}

async fn glob(pattern: &str) -> Vec<String> {
    expand(&Pattern::parse(pattern), &tree()).await.unwrap()
}

#[tokio::test]
async fn star_in_current_dir() {
    assert_eq!(glob("*.md").await, vec!["README.md"]);
    assert_eq!(glob("*").await, vec!["Cargo.toml", "README.md", "src", "tests"]);
}

#[tokio::test]
async fn star_under_literal_dir() {
    assert_eq!(glob("src/*.rs").await, vec!["src/lib.rs", "src/main.rs"]);
}

#[tokio::test]
async fn double_star_recurses_but_skips_hidden() {
    assert_eq!(
        glob("**.rs").await,
        vec!["src/lib.rs", "src/main.rs", "src/parse/mod.rs", "tests/a_tests.rs"]
    );
}

#[tokio::test]
async fn question_mark_and_dirs_only() {
    assert_eq!(glob("?est?").await, vec!["tests"]);
    assert_eq!(glob("*/").await, vec!["src/", "tests/"]);
}

#[tokio::test]
async fn hidden_needs_literal_dot() {
    assert_eq!(glob(".*").await, vec![".env"]);
}

#[tokio::test]
async fn no_match_is_empty() {
    assert!(glob("*.go").await.is_empty());
    assert!(glob("nope/*").await.is_empty());
}

#[tokio::test]
async fn real_fs_expansion() {
    let dir = std::env::temp_dir().join(format!("tern-glob-test-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("a.txt"), "a").unwrap();
    std::fs::write(dir.join("sub/b.txt"), "b").unwrap();

    let base = dir.to_string_lossy().trim_end_matches('/').to_string();
    let pattern = Pattern::parse(&format!("{}/**.txt", tern_glob::escape(&base)));
    let found = expand(&pattern, &RealFs).await.unwrap();

    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(found, vec![format!("{base}/a.txt"), format!("{base}/sub/b.txt")]);
}
