//! Passes over the assembled HTML document

pub mod cf;
pub mod links;

use crate::html::{Document, new_comment, new_element, prepend_child};

pub use cf::{CfRelation, apply_cf_styles};
pub use links::{LinkOptions, update_links};

/// Insert the generator `<meta>` first in `<head>` and a comment first in
/// `<body>`
pub fn stamp_generator(document: &Document, generator: &str) {
    if let Some(head) = document.first("head") {
        let meta = new_element("meta", &[("name", "generator"), ("content", generator)]);
        prepend_child(&head, meta);
    }
    if let Some(body) = document.first("body") {
        prepend_child(&body, new_comment(&format!(" Generated by {} ", generator)));
    }
}
