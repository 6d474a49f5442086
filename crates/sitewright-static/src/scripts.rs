//! Script stage: parse with oxc and re-emit.
//!
//! Parsing rejects syntax errors per file; the code generator normalizes the
//! output so what lands in `temp` is exactly what the bundler will minify.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use sitewright_tasks::{map_each, FileDescriptor, TaskError, Transform, TransformError};

/// Output flavour for [`emit_js`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsStyle {
    Readable,
    Minified,
}

/// Parse `source` and print it back in the requested style.
///
/// Files are parsed as ES modules first and as classic scripts when that
/// fails, so both `import` syntax and sloppy-mode scripts are accepted.
pub fn emit_js(source: &str, path: &Path, style: JsStyle) -> Result<String, String> {
    let allocator = Allocator::default();
    let module = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

    let mut parsed = Parser::new(&allocator, source, module).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        let script = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if script.panicked || !script.errors.is_empty() {
            let message = parsed
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unrecoverable syntax error".to_string());
            return Err(message);
        }
        parsed = script;
    }

    let options = match style {
        JsStyle::Readable => CodegenOptions::default(),
        JsStyle::Minified => CodegenOptions::minify(),
    };

    Ok(Codegen::new().with_options(options).build(&parsed.program).code)
}

/// Compiles every `.js` / `.mjs` file; other files pass through.
#[derive(Debug, Default)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for ScriptCompiler {
    fn name(&self) -> &str {
        "script"
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        map_each(files, |file| {
            if !matches!(file.extension().as_deref(), Some("js" | "mjs")) {
                return Ok(Some(file));
            }

            let source = file
                .text()
                .ok_or_else(|| TransformError::new(file.relative(), "file is not valid UTF-8"))?;
            let code = emit_js(source, file.relative(), JsStyle::Readable)
                .map_err(|e| TransformError::new(file.relative(), e))?;

            Ok(Some(file.with_contents(code)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_modules_and_scripts() {
        let files = vec![
            FileDescriptor::new("src", "assets/scripts/app.js", b"import { a } from './a.js';\nconsole.log(a)".to_vec()),
            FileDescriptor::new("src", "assets/scripts/legacy.js", b"with (obj) { x = 1 }".to_vec()),
        ];

        let output = ScriptCompiler::new().apply(files).unwrap();

        assert_eq!(output.len(), 2);
        assert!(output[0].text().unwrap().contains("console.log(a)"));
        assert!(output[1].text().unwrap().contains("with (obj)"));
    }

    #[test]
    fn reports_syntax_errors_per_file() {
        let files = vec![
            FileDescriptor::new("src", "ok.js", b"let a = 1;".to_vec()),
            FileDescriptor::new("src", "broken.js", b"function (".to_vec()),
            FileDescriptor::new("src", "also-broken.js", b"let = ;".to_vec()),
        ];

        match ScriptCompiler::new().apply(files).unwrap_err() {
            TaskError::Transform(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected transform errors, got {other:?}"),
        }
    }

    #[test]
    fn minified_output_drops_comments() {
        let code = emit_js("/* banner */\nvar  total = 1 +  2;\n", Path::new("a.js"), JsStyle::Minified).unwrap();

        assert!(!code.contains("banner"));
        assert!(code.starts_with("var total=1+2"));
    }
}
