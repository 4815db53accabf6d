use crate::core::flow_graph::model::Variables;
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{([^{}]+)\}\}")
            .unwrap_or_else(|err| panic!("invalid placeholder regex: {err}"))
    })
}

/// Replace every `{{name}}` in `text` with the named variable.
///
/// Unknown names are left as the literal placeholder. Replacement is a single
/// pass, so substituted values are never re-scanned.
pub fn substitute(text: &str, variables: &Variables) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    placeholder_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = caps[1].trim();
            match variables.get(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Names referenced by `{{...}}` placeholders, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}
