//! File sources for the upload scheduler

use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use super::UploadError;

/// Read-only view of the files to upload
#[async_trait::async_trait]
pub trait FileSource: Send + Sync {
    /// Paths currently matching the source
    async fn list(&self) -> Result<Vec<PathBuf>, UploadError>;

    /// Full contents of one file
    async fn read(&self, path: &Path) -> Result<Vec<u8>, UploadError>;
}

/// Local filesystem source driven by a glob-style pattern.
///
/// Supported shapes: `dir`, `dir/file.txt`, `dir/*.txt`, `dir/**` and
/// `dir/**/*.txt`. `*` and `?` never cross a path separator and, as with
/// shell globs, do not match names starting with a dot unless the pattern
/// itself does.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    root: PathBuf,
    recursive: bool,
    name: Regex,
    match_hidden: bool,
}

impl LocalFileSource {
    pub fn new(pattern: &str) -> Result<Self, UploadError> {
        let components: Vec<&str> = pattern.split('/').collect();

        let Some(split) = components.iter().position(|c| has_wildcard(c)) else {
            let path = Path::new(pattern);
            if path.is_dir() {
                return Self::build(path.to_path_buf(), false, "*");
            }
            let root = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| UploadError::InvalidPattern(pattern.to_string()))?;
            return Self::build(root, false, &escape_wildcards(name));
        };

        let root = match split {
            0 => PathBuf::from("."),
            1 if components[0].is_empty() => PathBuf::from("/"),
            _ => PathBuf::from(components[..split].join("/")),
        };

        match &components[split..] {
            ["**"] => Self::build(root, true, "*"),
            ["**", name] if !name.contains("**") => Self::build(root, true, name),
            [name] if !name.contains("**") => Self::build(root, false, name),
            _ => Err(UploadError::InvalidPattern(pattern.to_string())),
        }
    }

    fn build(root: PathBuf, recursive: bool, name: &str) -> Result<Self, UploadError> {
        Ok(Self {
            root,
            recursive,
            name: wildcard_regex(name)?,
            match_hidden: name.starts_with('.'),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, file_name: &str) -> bool {
        if file_name.starts_with('.') && !self.match_hidden {
            return false;
        }
        self.name.is_match(file_name)
    }

    fn walk(&self) -> Vec<PathBuf> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut paths = Vec::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(root = %self.root.display(), "Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if self.matches(name) => paths.push(entry.into_path()),
                Some(_) => {}
                None => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        "Skipping file with non UTF-8 name"
                    );
                }
            }
        }

        paths
    }
}

#[async_trait::async_trait]
impl FileSource for LocalFileSource {
    async fn list(&self) -> Result<Vec<PathBuf>, UploadError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.walk())
            .await
            .map_err(|e| UploadError::Enumerate(e.to_string()))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, UploadError> {
        tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn has_wildcard(component: &str) -> bool {
    component.contains(['*', '?'])
}

fn escape_wildcards(name: &str) -> String {
    name.replace('*', "\\*").replace('?', "\\?")
}

/// Translate a single-component wildcard into an anchored regex
fn wildcard_regex(name: &str) -> Result<Regex, UploadError> {
    let mut pattern = String::with_capacity(name.len() + 8);
    pattern.push('^');

    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '\\' => match chars.next() {
                Some(escaped) => pattern.push_str(&regex::escape(&escaped.to_string())),
                None => pattern.push_str(&regex::escape("\\")),
            },
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| UploadError::InvalidPattern(format!("{}: {}", name, e)))
}
