//! Class prefix rewriting.

use regex::{NoExpand, Regex};

use crate::batch::ArtifactKind;

/// Names that stay fixed while the prefix changes.
#[derive(Debug, Clone)]
pub struct PrefixRules<'a> {
    /// Prefix the library ships with. Renaming back to it also restores the
    /// unprefixed global symbol.
    pub default_prefix: &'a str,
    /// Global object exported by the scripts, e.g. `UIkit`.
    pub global_symbol: &'a str,
}

/// Rename the class prefix `from` to `to` in one artifact.
///
/// Only the prefix segment changes; the rest of each class name is kept. In
/// scripts the global symbol is renamed to `<to><symbol>` as well.
pub fn rewrite(text: &str, from: &str, to: &str, kind: ArtifactKind, rules: &PrefixRules) -> String {
    let from = regex::escape(from);

    match kind {
        ArtifactKind::Stylesheet => {
            let classes = Regex::new(&format!(r"(^|[^A-Za-z0-9_]){}-([a-z0-9-]+)", from))
                .expect("escaped prefix forms a valid pattern");
            classes
                .replace_all(text, format!("${{1}}{}-${{2}}", to).as_str())
                .into_owned()
        }
        ArtifactKind::Script => {
            let classes = Regex::new(&format!(r"(^|[^A-Za-z0-9_]){}-", from))
                .expect("escaped prefix forms a valid pattern");
            let renamed = classes.replace_all(text, format!("${{1}}{}-", to).as_str());

            let symbol = Regex::new(&format!(
                r"\b(?:{})?{}",
                from,
                regex::escape(rules.global_symbol)
            ))
            .expect("escaped symbol forms a valid pattern");
            let symbol_prefix = if to == rules.default_prefix { "" } else { to };
            symbol
                .replace_all(
                    &renamed,
                    NoExpand(&format!("{}{}", symbol_prefix, rules.global_symbol)),
                )
                .into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: PrefixRules<'static> = PrefixRules {
        default_prefix: "uk",
        global_symbol: "UIkit",
    };

    #[test]
    fn test_stylesheet_rename() {
        let out = rewrite(".uk-grid{display:flex}", "uk", "xy", ArtifactKind::Stylesheet, &RULES);
        assert_eq!(out, ".xy-grid{display:flex}");
    }

    #[test]
    fn test_stylesheet_keeps_unrelated_words() {
        let css = ".uk-card .bulk-item,[data-uk-grid]{--uk-gap:1px}";
        let out = rewrite(css, "uk", "xy", ArtifactKind::Stylesheet, &RULES);
        assert_eq!(out, ".xy-card .bulk-item,[data-xy-grid]{--xy-gap:1px}");
    }

    #[test]
    fn test_stylesheet_adjacent_classes() {
        let out = rewrite(".uk-a.uk-b>.uk-c", "uk", "xy", ArtifactKind::Stylesheet, &RULES);
        assert_eq!(out, ".xy-a.xy-b>.xy-c");
    }

    #[test]
    fn test_script_renames_symbol() {
        let js = "window.UIkit=UIkit;el.classList.add('uk-open');";
        let out = rewrite(js, "uk", "xy", ArtifactKind::Script, &RULES);
        assert_eq!(out, "window.xyUIkit=xyUIkit;el.classList.add('xy-open');");
    }

    #[test]
    fn test_script_back_to_default_drops_symbol_prefix() {
        let js = "window.xyUIkit=xyUIkit;'xy-open'";
        let out = rewrite(js, "xy", "uk", ArtifactKind::Script, &RULES);
        assert_eq!(out, "window.UIkit=UIkit;'uk-open'");
    }

    #[test]
    fn test_same_prefix_is_identity() {
        let js = "UIkit.util.addClass(el, 'uk-active')";
        assert_eq!(rewrite(js, "uk", "uk", ArtifactKind::Script, &RULES), js);
        let css = ".uk-active{}";
        assert_eq!(rewrite(css, "uk", "uk", ArtifactKind::Stylesheet, &RULES), css);
    }

    #[test]
    fn test_round_trip() {
        let css = ".uk-grid>.uk-width-1-2 .uk-card-body{margin:0}";
        let there = rewrite(css, "uk", "acme-ui", ArtifactKind::Stylesheet, &RULES);
        assert_eq!(there, ".acme-ui-grid>.acme-ui-width-1-2 .acme-ui-card-body{margin:0}");
        let back = rewrite(&there, "acme-ui", "uk", ArtifactKind::Stylesheet, &RULES);
        assert_eq!(back, css);
    }
}
