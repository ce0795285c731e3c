//! Stylesheet modules.
//!
//! `import styles from "./Card.module.css"` binds a plain lookup object
//! mapping each class selector found in the sibling stylesheet to itself.
//! The stylesheet text itself is injected into the preview document so the
//! classes actually apply.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref CLASS_RE: Regex = Regex::new(r"\.(-?[_a-zA-Z][_a-zA-Z0-9-]*)").unwrap();
    static ref URL_RE: Regex = Regex::new(r"(?s)url\([^)]*\)").unwrap();
}

/// Class names used in selectors, first-seen order, deduplicated.
///
/// Only selector text is looked at: anything between `:` .. `;` or inside a
/// declaration block is skipped, so `0.5em` or `url(a.png)` never yield a
/// class. Nested at-rule blocks are handled.
pub fn scrape_class_names(css: &str) -> Vec<String> {
    let without_comments = COMMENT_RE.replace_all(css, "");
    let cleaned = URL_RE.replace_all(&without_comments, "url()");

    let mut names: Vec<String> = Vec::new();
    let mut selector = String::new();
    for c in cleaned.chars() {
        match c {
            '{' => {
                let prelude = selector.trim();
                if !prelude.starts_with('@') {
                    for caps in CLASS_RE.captures_iter(prelude) {
                        let name = caps[1].to_string();
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
                selector.clear();
            }
            '}' | ';' => selector.clear(),
            _ => selector.push(c),
        }
    }
    names
}

/// JS object literal `{"card":"card",...}` for the scraped classes.
pub fn lookup_object(css: &str) -> String {
    let map: BTreeMap<String, String> = scrape_class_names(css)
        .into_iter()
        .map(|n| (n.clone(), n))
        .collect();
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrapes_selectors_only() {
        let css = r#"
/* .commented { } */
.card { padding: 0.5em; background: url(img.bg.png); }
.card:hover, .card-title > .icon { color: red; }
@media (max-width: 600px) {
  .card { padding: 0; }
  .compact { margin: 0 }
}
"#;
        assert_eq!(
            scrape_class_names(css),
            vec!["card", "card-title", "icon", "compact"]
        );
    }

    #[test]
    fn test_lookup_object() {
        assert_eq!(
            lookup_object(".b{} .a{}"),
            r#"{"a":"a","b":"b"}"#
        );
        assert_eq!(lookup_object(""), "{}");
    }
}
