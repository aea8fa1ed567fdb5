//! Grafting of conditional-formatting classes onto rendered cells

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::html::{Document, attribute, classes, set_attribute};

/// Extra classes for the cell `sheet!cell_ref`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfRelation {
    pub sheet: String,
    pub cell_ref: String,
    pub classes: BTreeSet<String>,
}

impl CfRelation {
    pub fn cell_id(&self) -> String {
        format!("{}!{}", self.sheet, self.cell_ref)
    }
}

/// Append each relation's sorted classes to the matching `<td id>`, in
/// relation order and after the existing classes. Relations without a
/// matching cell are ignored.
pub fn apply_cf_styles(document: &Document, relations: &[CfRelation]) {
    if relations.is_empty() {
        return;
    }
    let mut by_id: HashMap<String, Vec<&str>> = HashMap::new();
    for relation in relations {
        debug!(
            "Conditional formatting for '{}': {}",
            relation.cell_id(),
            relation.classes.iter().cloned().collect::<Vec<_>>().join(" ")
        );
        let pending = by_id.entry(relation.cell_id()).or_default();
        for class in &relation.classes {
            if !pending.contains(&class.as_str()) {
                pending.push(class);
            }
        }
    }

    for cell in document.elements("td") {
        let Some(new_classes) = attribute(&cell, "id").and_then(|id| by_id.get(&id)) else {
            continue;
        };
        let mut merged = classes(&cell);
        let before = merged.len();
        for class in new_classes {
            if !merged.iter().any(|c| c == class) {
                merged.push(class.to_string());
            }
        }
        if merged.len() != before {
            set_attribute(&cell, "class", &merged.join(" "));
        }
    }
}
