//! Style stage: compile SCSS/Sass to CSS.

use std::path::PathBuf;

use sitewright_tasks::{map_each, FileDescriptor, TaskError, Transform, TransformError};

/// Compiles `.scss` and `.sass` entry points to expanded CSS.
///
/// Partials (`_name.scss`) are not entry points and are dropped; they are
/// still resolvable through `@use`/`@import` from the file's own directory
/// and from every configured load path.
#[derive(Debug, Clone, Default)]
pub struct ScssCompiler {
    load_paths: Vec<PathBuf>,
}

impl ScssCompiler {
    pub fn new(load_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            load_paths: load_paths.into_iter().collect(),
        }
    }

    fn compile(&self, file: &FileDescriptor) -> Result<String, TransformError> {
        let source = file
            .text()
            .ok_or_else(|| TransformError::new(file.relative(), "file is not valid UTF-8"))?;

        let path = file.path();
        let syntax = match file.extension().as_deref() {
            Some("sass") => grass::InputSyntax::Sass,
            _ => grass::InputSyntax::Scss,
        };

        let mut options = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .input_syntax(syntax);
        if let Some(dir) = path.parent() {
            options = options.load_path(dir);
        }
        for load_path in &self.load_paths {
            options = options.load_path(load_path);
        }

        grass::from_string(source.to_string(), &options)
            .map_err(|e| TransformError::new(file.relative(), e))
    }
}

impl Transform for ScssCompiler {
    fn name(&self) -> &str {
        "scss"
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        map_each(files, |file| match file.extension().as_deref() {
            Some("scss" | "sass") => {
                let is_partial = file
                    .relative()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('_'));
                if is_partial {
                    return Ok(None);
                }

                let css = self.compile(&file)?;
                Ok(Some(file.with_contents(css).with_extension("css")))
            }
            _ => Ok(Some(file)),
        })
    }
}
