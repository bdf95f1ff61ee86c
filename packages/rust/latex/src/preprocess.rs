//! Source rewrites applied before conversion.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Rewrite constructs the conversion engine would otherwise drop.
///
/// Currently turns the `abstract` environment into a starred `Abstract`
/// section so it survives as a heading of its own.
pub fn preprocess(latex: &str) -> String {
    static ABSTRACT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\\begin\{abstract\}(.*?)\\end\{abstract\}").expect("abstract regex")
    });

    ABSTRACT_RE
        .replace_all(latex, |caps: &Captures| {
            format!("\\section*{{Abstract}}\n{}", caps[1].trim())
        })
        .into_owned()
}
