//! Post-process stage: bundle assets referenced from build blocks.
//!
//! A build block wraps the tags whose assets should be concatenated:
//!
//! ```html
//! <!-- build:css assets/styles/vendor.css -->
//! <link rel="stylesheet" href="/node_modules/bootstrap/dist/css/bootstrap.css">
//! <!-- endbuild -->
//! ```
//!
//! The block is replaced by a single tag pointing at the bundle, and the
//! bundle is emitted as a new file next to the pages.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use sitewright_tasks::{FileDescriptor, TaskError, Transform, TransformError};

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*build:(css|js)\s+(\S+?)\s*-->(.*?)<!--\s*endbuild\s*-->").unwrap()
});

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["'][^>]*>"#).unwrap()
});

static SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["'][^>]*>"#).unwrap()
});

/// Resolves build blocks in HTML pages.
#[derive(Debug, Clone)]
pub struct Useref {
    search_paths: Vec<PathBuf>,
}

/// A page with its blocks replaced, plus the bundles it referenced.
struct Processed {
    html: String,
    bundles: Vec<(PathBuf, String)>,
}

impl Useref {
    /// Referenced assets are looked up in each search path in order.
    pub fn new(search_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_paths: search_paths.into_iter().collect(),
        }
    }

    fn process(&self, page: &FileDescriptor) -> Result<Processed, TransformError> {
        let html = page
            .text()
            .ok_or_else(|| TransformError::new(page.relative(), "file is not valid UTF-8"))?;
        let page_dir = page.relative().parent().unwrap_or(Path::new(""));

        let mut bundles = Vec::new();
        let mut failure = None;

        let replaced = BLOCK_RE.replace_all(html, |caps: &Captures| {
            let kind = &caps[1];
            let target = &caps[2];
            let body = &caps[3];

            let refs = match kind {
                "css" => &*HREF_RE,
                _ => &*SRC_RE,
            };

            let mut parts = Vec::new();
            for asset in refs.captures_iter(body) {
                match self.resolve(&asset[1], page_dir) {
                    Some(path) => match fs::read_to_string(&path) {
                        Ok(content) => parts.push(content),
                        Err(e) => {
                            failure.get_or_insert_with(|| {
                                format!("failed to read {}: {}", path.display(), e)
                            });
                        }
                    },
                    None => {
                        failure.get_or_insert_with(|| format!("cannot find asset '{}'", &asset[1]));
                    }
                }
            }

            let separator = if kind == "js" { ";\n" } else { "\n" };
            bundles.push((bundle_path(target, page_dir), parts.join(separator)));

            match kind {
                "css" => format!(r#"<link rel="stylesheet" href="{target}">"#),
                _ => format!(r#"<script src="{target}"></script>"#),
            }
        });

        if let Some(message) = failure {
            return Err(TransformError::new(page.relative(), message));
        }

        Ok(Processed {
            html: replaced.into_owned(),
            bundles,
        })
    }

    /// Find a referenced asset in the search paths.
    fn resolve(&self, reference: &str, page_dir: &Path) -> Option<PathBuf> {
        let reference = reference
            .split(['?', '#'])
            .next()
            .unwrap_or(reference);
        let relative = match reference.strip_prefix('/') {
            Some(rooted) => PathBuf::from(rooted),
            None => page_dir.join(reference),
        };

        self.search_paths
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
    }
}

/// Bundle location relative to the pages' base directory.
fn bundle_path(target: &str, page_dir: &Path) -> PathBuf {
    let joined = match target.strip_prefix('/') {
        Some(rooted) => PathBuf::from(rooted),
        None => page_dir.join(target),
    };

    // Fold `..` so the bundle never escapes the output directory.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
            _ => {}
        }
    }
    normalized
}

impl Transform for Useref {
    fn name(&self) -> &str {
        "useref"
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        let mut pages = Vec::with_capacity(files.len());
        let mut bundles: BTreeMap<PathBuf, (PathBuf, String)> = BTreeMap::new();
        let mut errors = Vec::new();

        for file in files {
            if file.extension().as_deref() != Some("html") {
                pages.push(file);
                continue;
            }

            match self.process(&file) {
                Ok(processed) => {
                    for (path, content) in processed.bundles {
                        // First page to reference a bundle wins.
                        bundles
                            .entry(path)
                            .or_insert_with(|| (file.base().to_path_buf(), content));
                    }
                    pages.push(file.with_contents(processed.html));
                }
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(TaskError::Transform(errors));
        }

        let bundles = bundles
            .into_iter()
            .map(|(relative, (base, content))| FileDescriptor::new(base, relative, content.into_bytes()));
        pages.extend(bundles);

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn concatenates_blocks_into_bundles() {
        let temp = tempdir().unwrap();
        let scratch = temp.path().join("temp");
        write(&scratch, "assets/scripts/a.js", "var a = 1");
        write(temp.path(), "node_modules/lib/lib.js", "var lib = 2");
        write(&scratch, "assets/styles/main.css", "body { margin: 0 }");

        let html = r#"<head>
<!-- build:css assets/styles/main.bundle.css -->
<link rel="stylesheet" href="assets/styles/main.css">
<!-- endbuild -->
</head>
<body>
<!-- build:js assets/scripts/vendor.js -->
<script src="/node_modules/lib/lib.js"></script>
<script src="assets/scripts/a.js?v=1"></script>
<!-- endbuild -->
</body>"#;

        let useref = Useref::new([scratch.clone(), temp.path().to_path_buf()]);
        let output = useref
            .apply(vec![FileDescriptor::new(&scratch, "index.html", html.as_bytes().to_vec())])
            .unwrap();

        let names: Vec<_> = output.iter().map(|f| f.relative().to_path_buf()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("index.html"),
                PathBuf::from("assets/scripts/vendor.js"),
                PathBuf::from("assets/styles/main.bundle.css"),
            ]
        );

        let page = output[0].text().unwrap();
        assert!(page.contains(r#"<link rel="stylesheet" href="assets/styles/main.bundle.css">"#));
        assert!(page.contains(r#"<script src="assets/scripts/vendor.js"></script>"#));
        assert!(!page.contains("build:"));

        assert_eq!(output[1].text(), Some("var lib = 2;\nvar a = 1"));
        assert_eq!(output[2].text(), Some("body { margin: 0 }"));
    }

    #[test]
    fn shared_bundles_are_emitted_once() {
        let temp = tempdir().unwrap();
        write(temp.path(), "a.js", "1");
        let block = "<!-- build:js app.js --><script src=\"a.js\"></script><!-- endbuild -->";

        let output = Useref::new([temp.path().to_path_buf()])
            .apply(vec![
                FileDescriptor::new(temp.path(), "index.html", block.as_bytes().to_vec()),
                FileDescriptor::new(temp.path(), "about.html", block.as_bytes().to_vec()),
            ])
            .unwrap();

        assert_eq!(output.len(), 3);
    }

    #[test]
    fn missing_assets_fail_the_page() {
        let temp = tempdir().unwrap();
        let html = "<!-- build:js app.js --><script src=\"gone.js\"></script><!-- endbuild -->";

        let err = Useref::new([temp.path().to_path_buf()])
            .apply(vec![FileDescriptor::new(temp.path(), "index.html", html.as_bytes().to_vec())])
            .unwrap_err();

        match err {
            TaskError::Transform(errors) => {
                assert_eq!(errors[0].path, PathBuf::from("index.html"));
                assert!(errors[0].cause.contains("gone.js"));
            }
            other => panic!("expected transform error, got {other:?}"),
        }
    }

    #[test]
    fn pages_without_blocks_are_unchanged() {
        let output = Useref::new(Vec::new())
            .apply(vec![FileDescriptor::new("temp", "plain.html", b"<p>hi</p>".to_vec())])
            .unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].text(), Some("<p>hi</p>"));
    }

    #[test]
    fn bundle_paths_stay_inside_output() {
        assert_eq!(bundle_path("../x.js", Path::new("")), PathBuf::from("x.js"));
        assert_eq!(bundle_path("/a/b.css", Path::new("blog")), PathBuf::from("a/b.css"));
        assert_eq!(bundle_path("b.css", Path::new("blog")), PathBuf::from("blog/b.css"));
    }
}
