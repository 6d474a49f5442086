//! Glob groups and the file matcher.
//!
//! A [`GlobGroup`] pairs a set of glob patterns with the directory they are
//! resolved in. The same group drives both [`match_files`] (enumerating the
//! files a stage consumes) and the watcher (deciding which bindings a change
//! belongs to), so both sides always agree on what "matches".

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::MatchError;
use crate::file::FileDescriptor;

/// A set of patterns resolved against a directory.
///
/// Patterns starting with `!` are exclusions. `*` never crosses a path
/// separator; use `**` for recursive matches. Dotfiles and dot-directories are
/// never matched.
#[derive(Clone)]
pub struct GlobGroup {
    patterns: Vec<String>,
    cwd: PathBuf,
    base: PathBuf,
    include: Arc<GlobSet>,
    exclude: Arc<GlobSet>,
}

impl fmt::Debug for GlobGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobGroup")
            .field("patterns", &self.patterns)
            .field("cwd", &self.cwd)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl GlobGroup {
    /// Compile `patterns` against `cwd`. The base directory defaults to `cwd`.
    pub fn new<I, S>(cwd: impl Into<PathBuf>, patterns: I) -> Result<Self, MatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cwd = cwd.into();
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();

        for pattern in &patterns {
            let (builder, raw) = match pattern.strip_prefix('!') {
                Some(rest) => (&mut exclude, rest),
                None => (&mut include, pattern.as_str()),
            };

            let glob = GlobBuilder::new(raw.trim_start_matches("./"))
                .literal_separator(true)
                .build()
                .map_err(|e| MatchError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| MatchError::InvalidPattern {
                pattern: patterns.join(", "),
                message: e.to_string(),
            })
        };

        Ok(Self {
            include: Arc::new(build(include)?),
            exclude: Arc::new(build(exclude)?),
            base: cwd.clone(),
            cwd,
            patterns,
        })
    }

    /// Use a different directory as the root of the descriptors' relative paths.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Directory patterns are resolved in; also the watch root.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether a path relative to [`cwd`](Self::cwd) belongs to this group.
    pub fn matches(&self, relative: &Path) -> bool {
        if relative.as_os_str().is_empty() || is_hidden(relative) {
            return false;
        }
        let normalized = relative.to_string_lossy().replace('\\', "/");
        self.include.is_match(&normalized) && !self.exclude.is_match(&normalized)
    }

    /// Like [`matches`](Self::matches) for a path that may be absolute.
    ///
    /// Paths outside the group's directory never match.
    pub fn matches_path(&self, path: &Path) -> bool {
        if path.is_relative() {
            return self.matches(path);
        }
        let cwd = absolute(&self.cwd);
        match path.strip_prefix(&cwd) {
            Ok(relative) => self.matches(relative),
            Err(_) => false,
        }
    }
}

/// Resolve a glob group into its files.
///
/// Fails only when the group's directory does not exist; an empty match set
/// is an empty sequence. Files are yielded in path order and read lazily as
/// the sequence is consumed. Each call re-scans the directory.
pub fn match_files(group: &GlobGroup) -> Result<MatchedFiles, MatchError> {
    if !group.cwd.is_dir() {
        return Err(MatchError::NotFound(group.cwd.clone()));
    }

    let walker = WalkDir::new(&group.cwd)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    Ok(MatchedFiles {
        group: group.clone(),
        walker,
    })
}

/// Lazy sequence of files produced by [`match_files`].
pub struct MatchedFiles {
    group: GlobGroup,
    walker: walkdir::IntoIter,
}

impl Iterator for MatchedFiles {
    type Item = Result<FileDescriptor, MatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    return Some(Err(MatchError::Read {
                        path,
                        message: e.to_string(),
                    }));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.group.cwd) else {
                continue;
            };
            if !self.group.matches(relative) {
                continue;
            }

            return Some(self.read(path));
        }
    }
}

impl MatchedFiles {
    fn read(&self, path: &Path) -> Result<FileDescriptor, MatchError> {
        let contents = fs::read(path).map_err(|e| MatchError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let relative = path
            .strip_prefix(&self.group.base)
            .or_else(|_| path.strip_prefix(&self.group.cwd))
            .unwrap_or(path)
            .to_path_buf();

        Ok(FileDescriptor::new(self.group.base.clone(), relative, contents))
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn relatives(group: &GlobGroup) -> Vec<String> {
        match_files(group)
            .unwrap()
            .map(|f| f.unwrap().relative().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn star_does_not_cross_directories() {
        let group = GlobGroup::new("src", ["*.html"]).unwrap();

        assert!(group.matches(Path::new("index.html")));
        assert!(!group.matches(Path::new("layouts/basic.html")));
    }

    #[test]
    fn exclusions_win() {
        let group = GlobGroup::new("src", ["assets/**", "!assets/**/*.map"]).unwrap();

        assert!(group.matches(Path::new("assets/scripts/main.js")));
        assert!(!group.matches(Path::new("assets/scripts/main.js.map")));
    }

    #[test]
    fn hidden_files_never_match() {
        let group = GlobGroup::new("public", ["**"]).unwrap();

        assert!(group.matches(Path::new("favicon.ico")));
        assert!(!group.matches(Path::new(".DS_Store")));
        assert!(!group.matches(Path::new(".git/config")));
    }

    #[test]
    fn matches_preserve_structure_in_order() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "assets/styles/main.scss", "a{}");
        touch(temp.path(), "assets/styles/_vars.scss", "$c: red;");
        touch(temp.path(), "assets/scripts/main.js", "1");
        touch(temp.path(), "index.html", "<p>");

        let group = GlobGroup::new(temp.path(), ["assets/styles/*.scss"]).unwrap();

        assert_eq!(
            relatives(&group),
            vec!["assets/styles/_vars.scss", "assets/styles/main.scss"]
        );
    }

    #[test]
    fn matching_is_deterministic() {
        let temp = tempdir().unwrap();
        for name in ["c.txt", "a.txt", "nested/b.txt", "nested/deep/d.txt"] {
            touch(temp.path(), name, name);
        }

        let group = GlobGroup::new(temp.path(), ["**/*.txt"]).unwrap();
        let first = relatives(&group);
        let second = relatives(&group);

        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_match_is_not_an_error() {
        let temp = tempdir().unwrap();
        let group = GlobGroup::new(temp.path(), ["*.scss"]).unwrap();

        assert!(relatives(&group).is_empty());
    }

    #[test]
    fn missing_directory_is_not_found() {
        let temp = tempdir().unwrap();
        let group = GlobGroup::new(temp.path().join("missing"), ["**"]).unwrap();

        assert!(matches!(match_files(&group), Err(MatchError::NotFound(_))));
    }

    #[test]
    fn base_controls_relative_paths() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "src/pages/about.html", "<p>");

        let group = GlobGroup::new(temp.path().join("src/pages"), ["*.html"])
            .unwrap()
            .with_base(temp.path().join("src"));
        let file = match_files(&group).unwrap().next().unwrap().unwrap();

        assert_eq!(file.relative(), Path::new("pages/about.html"));
        assert_eq!(file.contents(), b"<p>");
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = GlobGroup::new("src", ["assets/[*.scss"]).unwrap_err();
        assert!(matches!(err, MatchError::InvalidPattern { .. }));
    }

    #[test]
    fn absolute_paths_outside_cwd_do_not_match() {
        let temp = tempdir().unwrap();
        let group = GlobGroup::new(temp.path(), ["**"]).unwrap();
        let inside = temp.path().canonicalize().unwrap().join("a.txt");

        assert!(group.matches_path(&inside));
        assert!(!group.matches_path(Path::new("/definitely/elsewhere/a.txt")));
    }
}
