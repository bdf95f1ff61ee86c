//! Appendix reclassification.
//!
//! Everything a paper places after its conclusion (acknowledgments,
//! references, supplementary sections) is moved under one synthetic appendix
//! section so the main narrative and the back matter are separate branches.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use papersplit_shared::{SectionNode, SplitConfig};

/// Leading section numbering: `5`, `5.`, `5.1`, `V.`, `A.`.
static NUMBERING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)*\.?|[ivxlcdm]+\.|[a-z]\.)\s+").expect("valid regex")
});

/// Move every top-level section after the conclusion under a new appendix
/// node appended right after it.
///
/// Returns `true` when an appendix was created. The tree is left unchanged
/// when no conclusion exists or the conclusion is already the last section.
#[instrument(skip_all, fields(top_level = root.children.len()))]
pub fn reclassify(root: &mut SectionNode, config: &SplitConfig) -> bool {
    let Some(position) = root
        .children
        .iter()
        .position(|node| is_conclusion(&node.title, &config.conclusion_titles))
    else {
        debug!("no conclusion section found, tree unchanged");
        return false;
    };

    if position + 1 == root.children.len() {
        debug!(position, "conclusion is the last section, nothing to move");
        return false;
    }

    let trailing = root.children.split_off(position + 1);
    let moved = trailing.len();

    let mut appendix = SectionNode::new(config.appendix_title.clone(), root.level + 1, 1);
    for mut node in trailing {
        node.set_level(appendix.level + 1);
        appendix.push_child(node);
    }
    root.push_child(appendix);

    info!(
        conclusion = %root.children[position].title,
        moved,
        "trailing sections moved under appendix"
    );
    true
}

/// Whether `title` names a conclusion according to `synonyms`.
///
/// `synonyms` are expected lowercase. A title matches when, after
/// normalization, it equals a synonym or starts with one followed by a space
/// (`Conclusion and Future Work`).
pub fn is_conclusion(title: &str, synonyms: &[String]) -> bool {
    let normalized = normalize_title(title);
    synonyms.iter().any(|synonym| {
        normalized == *synonym
            || normalized
                .strip_prefix(synonym.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
    })
}

fn normalize_title(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let unnumbered = NUMBERING_RE.replace(&lowered, "");
    let words = unnumbered.split_whitespace().collect::<Vec<_>>().join(" ");
    words
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}
