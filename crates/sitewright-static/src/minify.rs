//! Minifiers for the post-process step, selected by file extension.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use sitewright_tasks::{map_each, FileDescriptor, TaskError, Transform, TransformError};

use crate::scripts::{emit_js, JsStyle};

/// Minify CSS using lightningcss.
pub fn minify_css(css: &str) -> Result<String, String> {
    use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| format!("CSS parse error: {}", e))?;

    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| format!("CSS minify error: {}", e))?;

    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..Default::default()
        })
        .map_err(|e| format!("CSS minify error: {}", e))?;

    Ok(minified.code)
}

/// Minify JavaScript: whitespace and comments are dropped, names are kept.
pub fn minify_js(source: &str, path: &Path) -> Result<String, String> {
    emit_js(source, path, JsStyle::Minified)
}

static PROTECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(pre|textarea|script|style)\b([^>]*)>(.*?)</(?:pre|textarea|script|style)\s*>")
        .unwrap()
});

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--(.*?)-->").unwrap());

static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*(</?(?:!doctype|html|head|body|meta|link|title|base|script|style|noscript|div|p|ul|ol|li|dl|dt|dd|nav|main|header|footer|section|article|aside|h[1-6]|table|thead|tbody|tfoot|tr|td|th|form|fieldset|legend|hr|br|figure|figcaption|blockquote|option|select|template)\b[^>]*>)\s*",
    )
    .unwrap()
});

static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static TYPE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<(?:script|style|link)\b[^>]*?)\s+type\s*=\s*["']text/(?:javascript|css)["']"#)
        .unwrap()
});

static OPEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").unwrap());

static BOOLEAN_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s)(checked|disabled|selected|readonly|multiple|hidden|async|defer|autofocus|autoplay|controls|loop|muted|required|novalidate|open|reversed)\s*=\s*["'][^"']*["']"#)
        .unwrap()
});

static EMPTY_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+(?:class|id|style|title|lang|dir)\s*=\s*["']\s*["']"#).unwrap()
});

static BLOCK_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\\s*(\u{2}\\d+\u{2})\\s*").unwrap());

static ADJACENT_MARKERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{3}\\s+\u{3}").unwrap());

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{1}-\u{3}](\\d+)[\u{1}-\u{3}]").unwrap());

/// Minify an HTML document.
///
/// Removes comments (conditional comments are kept), collapses whitespace,
/// drops redundant `type` attributes, collapses boolean attributes, removes
/// empty attributes and minifies inline `<style>` and `<script>` bodies.
/// Contents of `<pre>` and `<textarea>` are left untouched.
pub fn minify_html(html: &str) -> String {
    let mut protected: Vec<String> = Vec::new();

    let stashed = PROTECTED_RE.replace_all(html, |caps: &Captures| {
        let tag = caps[1].to_ascii_lowercase();
        let attrs = &caps[2];
        let body = &caps[3];

        let body = match tag.as_str() {
            "style" => minify_css(body).unwrap_or_else(|_| body.trim().to_string()),
            "script" if is_javascript(attrs) && !body.trim().is_empty() => {
                minify_js(body, Path::new("inline.js"))
                    .map(|js| js.trim_end().to_string())
                    .unwrap_or_else(|_| body.trim().to_string())
            }
            _ => body.to_string(),
        };

        let open = clean_attributes(&format!("<{}{}>", &caps[1], attrs));
        protected.push(format!("{}{}</{}>", open, body, &caps[1]));

        // Only `<pre>` is block-level. Script and style may sit in running
        // text, so their surrounding whitespace is trimmed only between two
        // of them.
        let marker = match tag.as_str() {
            "pre" => '\u{2}',
            "script" | "style" => '\u{3}',
            _ => '\u{1}',
        };
        format!("{marker}{}{marker}", protected.len() - 1)
    });

    let without_comments = COMMENT_RE.replace_all(&stashed, |caps: &Captures| {
        let body = &caps[1];
        if body.starts_with("[if") || body.starts_with("<![endif") {
            caps[0].to_string()
        } else {
            String::new()
        }
    });

    let collapsed = SPACE_RE.replace_all(&without_comments, " ");
    let trimmed = BLOCK_TAG_RE.replace_all(&collapsed, "$1");
    let trimmed = BLOCK_MARKER_RE.replace_all(&trimmed, "$1");
    let trimmed = ADJACENT_MARKERS_RE.replace_all(&trimmed, "\u{3}\u{3}");
    let typed = TYPE_ATTR_RE.replace_all(&trimmed, "$1");
    let cleaned = OPEN_TAG_RE.replace_all(&typed, |caps: &Captures| clean_attributes(&caps[0]));

    let restored = PLACEHOLDER_RE.replace_all(cleaned.trim(), |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| protected.get(i).cloned())
            .unwrap_or_default()
    });

    let retyped = TYPE_ATTR_RE.replace_all(&restored, "$1");
    retyped.into_owned()
}

/// Collapse every boolean attribute and drop every empty one in an opening tag.
fn clean_attributes(tag: &str) -> String {
    let booleans = BOOLEAN_ATTR_RE.replace_all(tag, "$1$2");
    EMPTY_ATTR_RE.replace_all(&booleans, "").into_owned()
}

fn is_javascript(attrs: &str) -> bool {
    static TYPE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(?i)\btype\s*=\s*["']([^"']*)["']"#).unwrap());

    match TYPE_RE.captures(attrs) {
        None => true,
        Some(caps) => matches!(
            caps[1].to_ascii_lowercase().as_str(),
            "" | "text/javascript" | "application/javascript" | "module"
        ),
    }
}

/// Minifies `.js`, `.css` and `.html` files; anything else passes through.
#[derive(Debug, Default)]
pub struct MinifyByExtension;

impl Transform for MinifyByExtension {
    fn name(&self) -> &str {
        "minify"
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        map_each(files, |file| {
            let ext = file.extension();
            let Some(ext) = ext.as_deref().filter(|e| matches!(*e, "js" | "css" | "html")) else {
                return Ok(Some(file));
            };

            let text = file
                .text()
                .ok_or_else(|| TransformError::new(file.relative(), "file is not valid UTF-8"))?;

            let minified = match ext {
                "js" => minify_js(text, file.relative())
                    .map_err(|e| TransformError::new(file.relative(), e))?,
                "css" => minify_css(text).map_err(|e| TransformError::new(file.relative(), e))?,
                _ => minify_html(text),
            };

            Ok(Some(file.with_contents(minified)))
        })
    }
}
