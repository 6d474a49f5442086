//! Page stage: render HTML templates with minijinja.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{path_loader, Environment, Value};
use serde_json::{Map, Value as Json};
use sitewright_tasks::{map_each, FileDescriptor, TaskError, Transform, TransformError};

/// Renders page templates.
///
/// Templates can `{% include %}` and `{% extends %}` any file under the
/// template root. Nothing is cached between runs: each run builds a fresh
/// environment and re-reads the data directory.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    template_root: PathBuf,
    data_dir: PathBuf,
    package_json: Option<PathBuf>,
    extra: Map<String, Json>,
}

impl PageRenderer {
    pub fn new(template_root: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_root: template_root.into(),
            data_dir: data_dir.into(),
            package_json: None,
            extra: Map::new(),
        }
    }

    /// Expose a `package.json` as the `pkg` local.
    pub fn with_package(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_json = Some(path.into());
        self
    }

    /// Locals that override values loaded from the data directory.
    pub fn with_locals(mut self, extra: Map<String, Json>) -> Self {
        self.extra = extra;
        self
    }

    /// Collect template locals for one run.
    pub fn locals(&self) -> Result<Map<String, Json>, TaskError> {
        let mut locals = Map::new();

        if let Some(path) = self.package_json.as_ref().filter(|p| p.is_file()) {
            locals.insert("pkg".to_string(), read_data_file(path)?);
        }

        if self.data_dir.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(&self.data_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            entries.sort();

            for path in entries {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if !matches!(ext, "json" | "yaml" | "yml" | "toml") {
                    continue;
                }
                locals.insert(stem.to_string(), read_data_file(&path)?);
            }
        }

        for (key, value) in &self.extra {
            locals.insert(key.clone(), value.clone());
        }

        Ok(locals)
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_loader(path_loader(&self.template_root));
        env
    }
}

fn read_data_file(path: &Path) -> Result<Json, TaskError> {
    let content = fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let parsed = match ext {
        "yaml" | "yml" => serde_yaml::from_str::<Json>(&content).map_err(|e| e.to_string()),
        "toml" => toml::from_str::<Json>(&content).map_err(|e| e.to_string()),
        _ => serde_json::from_str::<Json>(&content).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| TaskError::from(TransformError::new(path, message)))
}

impl Transform for PageRenderer {
    fn name(&self) -> &str {
        "page"
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        let env = self.environment();
        let locals = Value::from_serialize(&self.locals()?);

        map_each(files, |file| {
            let source = file
                .text()
                .ok_or_else(|| TransformError::new(file.relative(), "file is not valid UTF-8"))?;
            let name = file.relative().to_string_lossy().replace('\\', "/");

            let html = env
                .render_named_str(&name, source, &locals)
                .map_err(|e| TransformError::new(file.relative(), e))?;

            Ok(Some(file.with_contents(html)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn page(relative: &str, source: &str) -> FileDescriptor {
        FileDescriptor::new("src", relative, source.as_bytes().to_vec())
    }

    #[test]
    fn renders_with_data_directory_locals() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("menus.json"), r#"[{"name": "Home"}, {"name": "About"}]"#).unwrap();
        fs::write(data.join("site.yaml"), "title: Pages\n").unwrap();

        let renderer = PageRenderer::new(temp.path(), &data);
        let output = renderer
            .apply(vec![page(
                "index.html",
                "<title>{{ site.title }}</title>{% for m in menus %}<a>{{ m.name }}</a>{% endfor %}",
            )])
            .unwrap();

        assert_eq!(
            output[0].text(),
            Some("<title>Pages</title><a>Home</a><a>About</a>")
        );
    }

    #[test]
    fn config_locals_override_data_files() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("site.toml"), "title = \"From file\"\n").unwrap();

        let mut extra = Map::new();
        extra.insert("site".to_string(), serde_json::json!({ "title": "From config" }));

        let locals = PageRenderer::new(temp.path(), &data)
            .with_locals(extra)
            .locals()
            .unwrap();

        assert_eq!(locals["site"]["title"], "From config");
    }

    #[test]
    fn supports_layouts_and_package_metadata() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("layouts")).unwrap();
        fs::write(
            temp.path().join("layouts/basic.html"),
            "<main>{% block body %}{% endblock %}</main>",
        )
        .unwrap();
        fs::write(temp.path().join("package.json"), r#"{"name": "demo"}"#).unwrap();

        let renderer = PageRenderer::new(temp.path(), temp.path().join("data"))
            .with_package(temp.path().join("package.json"));
        let output = renderer
            .apply(vec![page(
                "about.html",
                "{% extends 'layouts/basic.html' %}{% block body %}{{ pkg.name }}{% endblock %}",
            )])
            .unwrap();

        assert_eq!(output[0].text(), Some("<main>demo</main>"));
    }

    #[test]
    fn template_errors_name_the_page() {
        let temp = tempdir().unwrap();
        let renderer = PageRenderer::new(temp.path(), temp.path().join("data"));

        match renderer.apply(vec![page("bad.html", "{% for %}")]).unwrap_err() {
            TaskError::Transform(errors) => assert_eq!(errors[0].path, PathBuf::from("bad.html")),
            other => panic!("expected transform error, got {other:?}"),
        }
    }
}
