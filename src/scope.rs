//! Wrapping stylesheets under a scope selector and removing it again.

use regex::{Captures, Regex};

use crate::marker::{self, ScopeMarker};
use crate::render::{Render, RenderError};

/// Selectors that stay global inside a scoped stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalExceptions {
    /// Component class names, without the library prefix (`drag`).
    pub components: Vec<String>,
    /// Bare element selectors (`html`).
    pub elements: Vec<String>,
}

impl GlobalExceptions {
    /// Alternation matching every exception selector for the given prefix.
    fn pattern(&self, prefix: &str) -> Option<String> {
        let mut alternatives: Vec<String> = self
            .elements
            .iter()
            .map(|element| regex::escape(element))
            .collect();
        if !self.components.is_empty() {
            let components: Vec<String> = self
                .components
                .iter()
                .map(|component| regex::escape(component))
                .collect();
            alternatives.push(format!(
                r"\.{}-(?:{})",
                regex::escape(prefix),
                components.join("|")
            ));
        }
        (!alternatives.is_empty()).then(|| alternatives.join("|"))
    }
}

/// Applies a new scope to stylesheets through a [`Render`] round-trip.
pub struct ScopeEngine<'a> {
    renderer: &'a dyn Render,
    exceptions: &'a GlobalExceptions,
    /// Current library prefix; the component exceptions are `.{prefix}-{name}`.
    prefix: &'a str,
}

impl<'a> ScopeEngine<'a> {
    pub fn new(renderer: &'a dyn Render, exceptions: &'a GlobalExceptions, prefix: &'a str) -> Self {
        Self {
            renderer,
            exceptions,
            prefix,
        }
    }

    /// Scope every rule of `text` under `.{name}` and mark the result.
    ///
    /// With an `existing` marker the new scope becomes the innermost one, so
    /// selectors read `.{existing...} .{name} <rule>`.
    pub fn apply(
        &self,
        text: &str,
        name: &str,
        existing: Option<&ScopeMarker>,
    ) -> Result<String, RenderError> {
        let source = format!(".{} {{\n{}\n}}", name, marker::remove_all(text));
        let rendered = self.renderer.render(&source)?;

        let unwrapped = strip_wrapper(&rendered, name);
        let released = self.release_globals(&unwrapped, name);
        let (body, marker) = match existing.filter(|m| !m.is_empty()) {
            Some(existing) => (
                nest_inside(&released, name, existing),
                existing.appended(name),
            ),
            None => (released, ScopeMarker::single(name)),
        };

        Ok(format!("{}{}", marker.encode(), body))
    }

    /// Drop the scope in front of selectors that must stay global.
    fn release_globals(&self, text: &str, name: &str) -> String {
        let Some(globals) = self.exceptions.pattern(self.prefix) else {
            return text.to_string();
        };
        let pattern = Regex::new(&format!(
            r"\.{}\s+({})([^A-Za-z0-9_-]|$)",
            regex::escape(name),
            globals
        ))
        .expect("escaped names form a valid pattern");
        pattern.replace_all(text, "${1}${2}").into_owned()
    }
}

/// Remove the synthetic wrapper left in rendered output.
///
/// That is the padding newline on each side and any rule written on the bare
/// `.{name}` selector, located with a bracket-depth scan.
fn strip_wrapper(rendered: &str, name: &str) -> String {
    let text = rendered.strip_prefix('\n').unwrap_or(rendered);
    let text = text.strip_suffix('\n').unwrap_or(text);

    let selector = format!(".{}", name);
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut item_start = 0usize;
    let mut copied = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2);
                if depth == 0 {
                    item_start = i;
                }
                continue;
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            }
            b'{' => {
                if depth == 0 && text[item_start..i].trim() == selector {
                    let close = matching_brace(bytes, i);
                    let lead = text[item_start..i].len() - text[item_start..i].trim_start().len();
                    out.push_str(&text[copied..item_start + lead]);
                    copied = close;
                    i = close;
                    item_start = close;
                    continue;
                }
                depth += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                item_start = i + 1;
            }
            b';' if depth == 0 => item_start = i + 1,
            _ => {}
        }
        i += 1;
    }

    out.push_str(&text[copied.min(text.len())..]);
    out
}

/// Index just past the brace closing the block opened at `open`.
fn matching_brace(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Move the new scope behind the chain that was already applied, including
/// rules written on the bare chain.
fn nest_inside(text: &str, name: &str, existing: &ScopeMarker) -> String {
    let chain = existing.selector_chain();
    let pattern = Regex::new(&format!(
        r"\.{} {}(\s|\{{)",
        regex::escape(name),
        regex::escape(&chain)
    ))
    .expect("escaped names form a valid pattern");
    pattern
        .replace_all(text, |caps: &Captures| format!("{} .{}{}", chain, name, &caps[1]))
        .into_owned()
}

/// Remove the scope chain recorded in `marker` and every marker comment.
///
/// Without a marker only stray marker comments are removed, so stripping an
/// unscoped stylesheet leaves it untouched.
pub fn strip(text: &str, marker: Option<&ScopeMarker>) -> String {
    let unscoped = match marker.filter(|m| !m.is_empty()) {
        Some(marker) => {
            let pattern = Regex::new(&format!(
                r"(^|[^A-Za-z0-9_-]){}(?:\s*\{{[^}}]*\}}| )",
                regex::escape(&marker.selector_chain())
            ))
            .expect("escaped chain forms a valid pattern");
            pattern.replace_all(text, "${1}").into_owned()
        }
        None => text.to_string(),
    };
    marker::remove_all(&unscoped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NestingRenderer;

    fn exceptions() -> GlobalExceptions {
        GlobalExceptions {
            components: ["drag", "modal-page", "offcanvas-page", "offcanvas-flip"]
                .map(String::from)
                .to_vec(),
            elements: vec!["html".to_string()],
        }
    }

    fn apply(text: &str, name: &str, existing: Option<&ScopeMarker>) -> String {
        let exceptions = exceptions();
        ScopeEngine::new(&NestingRenderer, &exceptions, "uk")
            .apply(text, name, existing)
            .unwrap()
    }

    #[test]
    fn test_apply_marks_and_keeps_globals() {
        let out = apply(".uk-grid{color:red} html{margin:0}", "uk-scope", None);
        assert!(out.starts_with("/* scoped: uk-scope */"));
        assert!(out.contains(".uk-scope .uk-grid{color:red}"));
        assert!(out.contains(" html{margin:0}"));
        assert!(!out.contains(".uk-scope html"));
        assert_eq!(out, "/* scoped: uk-scope */.uk-scope .uk-grid{color:red} html{margin:0}");
    }

    #[test]
    fn test_apply_releases_component_exceptions() {
        let css = ".uk-drag,.uk-drag *{cursor:move}.uk-modal-page{overflow:hidden}.uk-dragger{x:y}";
        let out = apply(css, "s", None);
        assert_eq!(
            out,
            "/* scoped: s */.uk-drag,.uk-drag *{cursor:move}.uk-modal-page{overflow:hidden}.s .uk-dragger{x:y}"
        );
    }

    #[test]
    fn test_strip_restores_original() {
        let css = "/*! lib */\n.uk-grid {\n  display: flex;\n}\n.a, .b > .c{x:y}\n@media (min-width: 640px) {\n  .uk-card { padding: 0; }\n}\n";
        let scoped = apply(css, "my-scope", None);
        let marker = marker::decode(&scoped, "uk-scope").unwrap();
        assert_eq!(marker, ScopeMarker::single("my-scope"));
        assert_eq!(strip(&scoped, Some(&marker)), css);
    }

    #[test]
    fn test_two_layers_strip_in_one_pass() {
        let css = ".uk-grid{display:flex}\n.uk-card{padding:0}";
        let first = apply(css, "s1", None);
        let first_marker = marker::decode(&first, "uk-scope").unwrap();
        let second = apply(&first, "s2", Some(&first_marker));

        let marker = marker::decode(&second, "uk-scope").unwrap();
        assert_eq!(marker.to_string(), "s1 s2");
        assert_eq!(second.matches("/* scoped:").count(), 1);
        assert!(second.contains(".s1 .s2 .uk-grid{display:flex}"));

        assert_eq!(strip(&second, Some(&marker)), css);
    }

    #[test]
    fn test_strip_twice_is_noop() {
        let scoped = apply(".a{b:c}", "s", None);
        let once = strip(&scoped, Some(&ScopeMarker::single("s")));
        assert_eq!(once, ".a{b:c}");
        assert_eq!(strip(&once, None), once);
    }

    #[test]
    fn test_strip_bare_chain_rule() {
        let text = "/* scoped: s */.s {color:red}.s .a{b:c}";
        assert_eq!(strip(text, Some(&ScopeMarker::single("s"))), ".a{b:c}");
    }

    #[test]
    fn test_wrapper_declarations_are_dropped() {
        let out = apply("color:red;\n.a{b:c}", "s", None);
        assert_eq!(out, "/* scoped: s */\n.s .a{b:c}");
    }

    #[test]
    fn test_legacy_scope_gets_appended() {
        let legacy = ".uk-scope .uk-grid{display:flex}";
        let existing = marker::decode(legacy, "uk-scope").unwrap();
        let out = apply(legacy, "app", Some(&existing));
        assert_eq!(out, "/* scoped: uk-scope app */.uk-scope .app .uk-grid{display:flex}");
    }

    #[test]
    fn test_comment_only_stylesheet_round_trips() {
        let css = "/*! license */";
        let scoped = apply(css, "s", None);
        assert_eq!(scoped, "/* scoped: s *//*! license */");
        assert_eq!(strip(&scoped, Some(&ScopeMarker::single("s"))), css);
    }

    #[test]
    fn test_import_only_stylesheet_round_trips() {
        let css = "@charset \"UTF-8\";\n@import url(a.css);";
        let scoped = apply(css, "s", None);
        assert!(scoped.contains("@import url(a.css);"));
        assert_eq!(strip(&scoped, Some(&ScopeMarker::single("s"))), css);
    }

    #[test]
    fn test_ampersand_inside_attribute_is_scoped() {
        let css = "a[href*=\"&\"]{color:red}";
        let scoped = apply(css, "s", None);
        assert_eq!(scoped, "/* scoped: s */.s a[href*=\"&\"]{color:red}");
        assert_eq!(strip(&scoped, Some(&ScopeMarker::single("s"))), css);
    }

    #[test]
    fn test_legacy_bare_scope_rule_is_nested() {
        let legacy = ".uk-scope{color:red} .uk-scope .uk-grid{display:flex}";
        let existing = marker::decode(legacy, "uk-scope").unwrap();
        let out = apply(legacy, "app", Some(&existing));
        assert_eq!(
            out,
            "/* scoped: uk-scope app */.uk-scope .app{color:red} .uk-scope .app .uk-grid{display:flex}"
        );
        let marker = marker::decode(&out, "uk-scope").unwrap();
        assert_eq!(strip(&out, Some(&marker)), " .uk-grid{display:flex}");
    }

    #[test]
    fn test_strip_respects_class_boundaries() {
        let text = "/* scoped: s */.s .a{b:c}.foo.s .x{d:e},.s .y{f:g}";
        assert_eq!(
            strip(text, Some(&ScopeMarker::single("s"))),
            ".a{b:c}.foo.s .x{d:e},.y{f:g}"
        );
    }

    #[test]
    fn test_render_failure_propagates() {
        let exceptions = exceptions();
        let engine = ScopeEngine::new(&NestingRenderer, &exceptions, "uk");
        assert!(engine.apply(".a{b:c", "s", None).is_err());
    }
}
