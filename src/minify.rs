//! Minified copies of written stylesheets.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::storage::Storage;

/// Produces the minified variant of a stylesheet after it has been written.
pub trait Minify: Sync {
    /// Minify `path` and return where the result was written.
    fn minify(&self, storage: &dyn Storage, path: &Path) -> Result<PathBuf>;
}

/// Writes `name.min.css` next to `name.css`.
///
/// Comments are dropped except `/*!` notices and scope markers, whitespace is
/// collapsed, and the last `;` of each block is removed. Strings are kept as-is.
#[derive(Debug, Clone)]
pub struct CssMinifier {
    suffix: String,
}

impl CssMinifier {
    pub fn new(minified_suffix: impl Into<String>) -> Self {
        Self {
            suffix: minified_suffix.into(),
        }
    }

    pub fn target(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}{}", stem, self.suffix))
    }
}

impl Minify for CssMinifier {
    fn minify(&self, storage: &dyn Storage, path: &Path) -> Result<PathBuf> {
        let css = storage.read(path)?;
        let target = self.target(path);
        storage.write(&target, &minify_css(&css))?;
        Ok(target)
    }
}

fn is_tight(c: char) -> bool {
    matches!(c, '{' | '}' | ';' | ',')
}

pub fn minify_css(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending_space = false;
    let mut rest = css;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("/*") {
            let end = rest[2..].find("*/").map_or(rest.len(), |i| i + 4);
            let comment = &rest[..end];
            if comment.starts_with("/*!") || comment.starts_with("/* scoped:") {
                flush_space(&mut out, &mut pending_space, '/');
                out.push_str(comment);
            }
            rest = &rest[end..];
            continue;
        }

        if c.is_whitespace() {
            pending_space = !out.is_empty();
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if c == '"' || c == '\'' {
            let end = string_end(rest, c);
            flush_space(&mut out, &mut pending_space, c);
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }

        if c == '}' && out.ends_with(';') {
            out.pop();
        }
        flush_space(&mut out, &mut pending_space, c);
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn flush_space(out: &mut String, pending: &mut bool, next: char) {
    if *pending && !is_tight(next) && !out.ends_with(is_tight) && !out.ends_with("*/") {
        out.push(' ');
    }
    *pending = false;
}

fn string_end(s: &str, quote: char) -> usize {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            _ if c == quote => return i + 1,
            _ => {}
        }
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_collapses_whitespace() {
        let css = "/*! UIkit */\n.a ,\n.b > .c {\n  color: red;\n  margin: 0 auto;\n}\n/* note */\n@media (min-width: 640px) {\n  .d { padding: 0; }\n}\n";
        assert_eq!(
            minify_css(css),
            "/*! UIkit */.a,.b > .c{color: red;margin: 0 auto}@media (min-width: 640px){.d{padding: 0}}"
        );
    }

    #[test]
    fn test_minify_keeps_strings_and_marker() {
        let css = "/* scoped: s */ .s .a::before { content: \"a  ;  b\"; }";
        assert_eq!(minify_css(css), "/* scoped: s */.s .a::before{content: \"a  ;  b\"}");
    }

    #[test]
    fn test_target_path() {
        let minifier = CssMinifier::new(".min.css");
        assert_eq!(
            minifier.target(Path::new("dist/css/uikit.css")),
            PathBuf::from("dist/css/uikit.min.css")
        );
    }
}
