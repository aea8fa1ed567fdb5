//! Rewriting of sheet navigation and external links in the finished document

use markup5ever_rcdom::Handle;
use std::collections::HashMap;
use tracing::debug;

use crate::html::{
    Document, attribute, classes, deep_clone, has_attribute, insert_after, merge_tokens,
    set_attribute,
};

pub const SHEET_LINK_CLASS: &str = "xlsx_sheet-link";
pub const SHAREPOINT_VISIBLE_CLASS: &str = "sharepoint_visible";
pub const JS_VISIBLE_CLASS: &str = "js_visible";

const EXTERNAL_REL: [&str; 2] = ["noopener", "noreferrer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub update_local_links: bool,
    pub update_external_links: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            update_local_links: true,
            update_external_links: true,
        }
    }
}

/// Rewrite every anchor of `document`.
///
/// `sheet_ids` maps sheet display names to their encoded ids. Local links to
/// a known sheet become a pair of anchors (embedded viewer and script
/// navigation); http(s) links open in a new browsing context. Anchors already
/// carrying the sheet-link marker are left alone.
pub fn update_links(document: &Document, sheet_ids: &HashMap<String, String>, options: LinkOptions) {
    let mut rewritten = 0;
    for anchor in document.elements("a") {
        if rewrite_anchor(&anchor, sheet_ids, options) {
            rewritten += 1;
        }
    }
    debug!("Rewrote {} links", rewritten);
}

fn rewrite_anchor(anchor: &Handle, sheet_ids: &HashMap<String, String>, options: LinkOptions) -> bool {
    let existing = classes(anchor);
    if existing.iter().any(|c| c == SHEET_LINK_CLASS) {
        return false;
    }
    let Some(href) = attribute(anchor, "href").filter(|h| !h.is_empty()) else {
        return false;
    };
    let existing = existing.iter().map(String::as_str);

    if let Some(reference) = href.strip_prefix('#') {
        if !options.update_local_links {
            return false;
        }
        let Some(sheet_id) = sheet_ids.get(&resolve_sheet_name(reference, sheet_ids)) else {
            return false;
        };

        let script = deep_clone(anchor);
        set_attribute(&script, "href", &format!("#{}", sheet_id));
        set_attribute(
            &script,
            "class",
            &merge_tokens([SHEET_LINK_CLASS, JS_VISIBLE_CLASS], existing.clone()),
        );

        set_attribute(anchor, "href", &format!("about:srcdoc#{}", sheet_id));
        set_attribute(
            anchor,
            "class",
            &merge_tokens([SHEET_LINK_CLASS, SHAREPOINT_VISIBLE_CLASS], existing),
        );
        insert_after(anchor, script);
        return true;
    }

    if !options.update_external_links || !is_external(&href) {
        return false;
    }
    set_attribute(
        anchor,
        "class",
        &merge_tokens([SHEET_LINK_CLASS, JS_VISIBLE_CLASS], existing),
    );
    if !has_attribute(anchor, "target") {
        set_attribute(anchor, "target", "_blank");
    }
    let rel = attribute(anchor, "rel").unwrap_or_default();
    set_attribute(anchor, "rel", &merge_tokens(EXTERNAL_REL, rel.split_whitespace()));
    true
}

fn is_external(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

/// Sheet name a local reference points to: an exact sheet name, the part
/// before `!` (quotes removed), or the part before a trailing `.A1` suffix
pub fn resolve_sheet_name(reference: &str, sheet_ids: &HashMap<String, String>) -> String {
    if sheet_ids.contains_key(reference) {
        return reference.to_string();
    }
    if let Some((sheet, _)) = reference.split_once('!') {
        if sheet.len() >= 2 && sheet.starts_with('\'') && sheet.ends_with('\'') {
            return sheet[1..sheet.len() - 1].replace("''", "'");
        }
        return sheet.to_string();
    }
    if let Some((candidate, _)) = reference.rsplit_once('.')
        && sheet_ids.contains_key(candidate)
    {
        return candidate.to_string();
    }
    reference.to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheets() -> HashMap<String, String> {
        HashMap::from([
            ("Sheet 1".to_string(), "sheet_001".to_string()),
            ("O'Brien".to_string(), "sheet_002".to_string()),
            ("Data".to_string(), "sheet_000".to_string()),
            ("Café".to_string(), "sheet_003".to_string()),
        ])
    }

    fn rewrite(html: &str, options: LinkOptions) -> String {
        let document = Document::parse(html);
        update_links(&document, &sheets(), options);
        document.to_html().unwrap()
    }

    fn page(body: &str) -> String {
        format!("<html><head></head><body>{}</body></html>", body)
    }

    #[test]
    fn test_resolve_sheet_name() {
        let ids = sheets();
        assert_eq!(resolve_sheet_name("Data", &ids), "Data");
        assert_eq!(resolve_sheet_name("'Sheet 1'!A1", &ids), "Sheet 1");
        assert_eq!(resolve_sheet_name("'O''Brien'!B2", &ids), "O'Brien");
        assert_eq!(resolve_sheet_name("Data!C3", &ids), "Data");
        assert_eq!(resolve_sheet_name("Sheet 1.A1", &ids), "Sheet 1");
        assert_eq!(resolve_sheet_name("Unknown.A1", &ids), "Unknown.A1");
    }

    #[test]
    fn test_local_links_become_pairs() {
        let html = r##"<div><a><span>No href</span></a><a href="#Sheet 1.A1" title="go"><span>Go local</span></a></div>"##;
        assert_eq!(
            rewrite(html, LinkOptions::default()),
            page(concat!(
                r##"<div><a><span>No href</span></a>"##,
                r##"<a href="about:srcdoc#sheet_001" title="go" class="xlsx_sheet-link sharepoint_visible"><span>Go local</span></a>"##,
                r##"<a href="#sheet_001" title="go" class="xlsx_sheet-link js_visible"><span>Go local</span></a></div>"##
            ))
        );
    }

    #[test]
    fn test_quoted_angle_bracket_in_attribute() {
        let output = rewrite(r##"<a title="x > y" href="#Data">go</a>"##, LinkOptions::default());
        assert_eq!(
            output,
            page(concat!(
                r##"<a title="x > y" href="about:srcdoc#sheet_000" class="xlsx_sheet-link sharepoint_visible">go</a>"##,
                r##"<a title="x > y" href="#sheet_000" class="xlsx_sheet-link js_visible">go</a>"##
            ))
        );
    }

    #[test]
    fn test_escaped_references_are_decoded() {
        let output = rewrite(
            r##"<a href="#Caf&eacute;!A1">menu</a><a href="#&#39;O&#39;&#39;Brien&#39;!A1">b</a>"##,
            LinkOptions::default(),
        );
        assert!(output.contains(r##"<a href="#sheet_003" class="xlsx_sheet-link js_visible">menu</a>"##));
        assert!(output.contains(r##"<a href="#sheet_002" class="xlsx_sheet-link js_visible">b</a>"##));
    }

    #[test]
    fn test_script_and_style_text_is_untouched() {
        let html = concat!(
            "<html><head><style>a[href=\"#Data\"] { color: red; }</style></head><body>",
            "<script>var s = '<a href=\"https://x.com\">' + '</a>';</script>",
            "</body></html>"
        );
        let output = rewrite(html, LinkOptions::default());
        assert_eq!(output, html);
        assert!(!output.contains(SHEET_LINK_CLASS));
    }

    #[test]
    fn test_existing_classes_are_kept() {
        let html = r##"<a class="nav js_visible" href="#'O''Brien'!A1">x</a>"##;
        let output = rewrite(html, LinkOptions::default());
        assert!(output.contains(r##"class="xlsx_sheet-link sharepoint_visible nav js_visible""##));
        assert!(output.contains(r##"<a class="xlsx_sheet-link js_visible nav" href="#sheet_002">x</a>"##));
    }

    #[test]
    fn test_unknown_sheets_and_other_schemes_are_untouched() {
        let body = concat!(
            r##"<a href="#Missing!A1">a</a>"##,
            r##"<a href="mailto:someone@example.com">b</a>"##,
            r##"<a href="tel:+123">c</a>"##,
            r##"<a href="docs/readme.html">d</a>"##,
            r##"<a href="">e</a>"##
        );
        assert_eq!(rewrite(body, LinkOptions::default()), page(body));
    }

    #[test]
    fn test_external_links_are_hardened() {
        let html = concat!(
            r##"<a href="https://example.com"><strong>Go external</strong></a>"##,
            r##"<a href="//cdn.example.com/x" target="_self" rel="nofollow noopener">y</a>"##
        );
        assert_eq!(
            rewrite(html, LinkOptions::default()),
            page(concat!(
                r##"<a href="https://example.com" class="xlsx_sheet-link js_visible" target="_blank" rel="noopener noreferrer"><strong>Go external</strong></a>"##,
                r##"<a href="//cdn.example.com/x" target="_self" rel="noopener noreferrer nofollow" class="xlsx_sheet-link js_visible">y</a>"##
            ))
        );
    }

    #[test]
    fn test_rewriting_is_idempotent() {
        let html = r##"<p><a href="#Data!A1">Data</a> <a href="http://example.com">ext</a></p>"##;
        let once = rewrite(html, LinkOptions::default());
        let twice = rewrite(&once, LinkOptions::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_options_disable_passes() {
        let html = r##"<a href="#Data">a</a><a href="https://example.com">b</a>"##;
        let local_only = LinkOptions {
            update_local_links: true,
            update_external_links: false,
        };
        let output = rewrite(html, local_only);
        assert!(output.contains(r##"href="about:srcdoc#sheet_000""##));
        assert!(output.ends_with(r##"<a href="https://example.com">b</a></body></html>"##));

        let none = LinkOptions {
            update_local_links: false,
            update_external_links: false,
        };
        assert_eq!(rewrite(html, none), page(html));
    }
}
