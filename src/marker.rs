//! Detection of the state an artifact is already in.
//!
//! A scoped stylesheet carries a `/* scoped: a b */` comment listing the scope
//! names in the order they were applied. Builds scoped before that comment
//! existed are recognised by the fixed legacy selector alone. The class prefix
//! is not recorded anywhere and is discovered from the `<prefix>-grid` class.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"/\* scoped: ([^*]*) \*/").expect("marker pattern is valid"))
}

/// The chain of scope names applied to a stylesheet, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMarker {
    names: Vec<String>,
}

impl ScopeMarker {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(name: &str) -> Self {
        Self::new([name])
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// A new marker with `name` added as the innermost scope.
    pub fn appended(&self, name: &str) -> Self {
        let mut names = self.names.clone();
        names.push(name.to_string());
        Self { names }
    }

    /// The comment token prepended to a scoped stylesheet.
    pub fn encode(&self) -> String {
        format!("/* scoped: {} */", self)
    }

    /// Descendant selector matching the whole chain, e.g. `.a .b`.
    pub fn selector_chain(&self) -> String {
        self.names
            .iter()
            .map(|name| format!(".{}", name))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ScopeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(" "))
    }
}

/// Read the scope marker of a stylesheet.
///
/// The explicit comment wins; otherwise the presence of `.{legacy_selector}`
/// (as a whole class name) yields a single-name marker.
pub fn decode(text: &str, legacy_selector: &str) -> Option<ScopeMarker> {
    if let Some(caps) = marker_regex().captures(text) {
        let marker = ScopeMarker::new(caps[1].split_whitespace());
        return (!marker.is_empty()).then_some(marker);
    }

    let legacy = Regex::new(&format!(
        r"\.{}(?:[^A-Za-z0-9_-]|$)",
        regex::escape(legacy_selector)
    ))
    .ok()?;
    legacy
        .is_match(text)
        .then(|| ScopeMarker::single(legacy_selector))
}

/// Remove every marker comment from `text`.
pub fn remove_all(text: &str) -> String {
    marker_regex().replace_all(text, "").into_owned()
}

/// Find the class prefix in use by looking for the `<prefix>-{suffix}` class.
pub fn detect_prefix(text: &str, suffix: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r"(?:^|[^A-Za-z0-9_-])([A-Za-z][A-Za-z0-9-]*)-{}",
        regex::escape(suffix)
    ))
    .ok()?;
    pattern.captures(text).map(|caps| caps[1].to_string())
}
