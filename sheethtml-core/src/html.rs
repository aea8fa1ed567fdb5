//! HTML helpers shared by the renderer and the post-processing passes

use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{Attribute, LocalName, Namespace, QualName, parse_document};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Escape text for use in element content and quoted attribute values
pub fn escape_html(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Merge whitespace-separated tokens, keeping `first` tokens first and
/// dropping duplicates
pub fn merge_tokens<'a>(
    first: impl IntoIterator<Item = &'a str>,
    then: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for token in first.into_iter().chain(then) {
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(" ")
}

/// A parsed HTML document, edited in place by the post-processing passes
pub struct Document {
    dom: RcDom,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        Self { dom }
    }

    /// Elements with the local name `name`, in document order
    pub fn elements(&self, name: &str) -> Vec<Handle> {
        let mut found = Vec::new();
        collect_elements(&self.dom.document, name, &mut found);
        found
    }

    /// First element named `name`
    pub fn first(&self, name: &str) -> Option<Handle> {
        self.elements(name).into_iter().next()
    }

    pub fn to_html(&self) -> io::Result<String> {
        let mut bytes = Vec::new();
        let document: SerializableHandle = self.dom.document.clone().into();
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        };
        serialize(&mut bytes, &document, opts)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn collect_elements(node: &Handle, name: &str, out: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        if let NodeData::Element { name: qual, .. } = &child.data
            && &*qual.local == name
        {
            out.push(child.clone());
        }
        collect_elements(child, name, out);
    }
}

fn attribute_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

/// Decoded value of the attribute `name`
pub fn attribute(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn has_attribute(node: &Handle, name: &str) -> bool {
    attribute(node, name).is_some()
}

/// Replace the value of `name` in place, or append it
pub fn set_attribute(node: &Handle, name: &str, value: &str) {
    let NodeData::Element { attrs, .. } = &node.data else {
        return;
    };
    let mut attrs = attrs.borrow_mut();
    match attrs.iter_mut().find(|a| &*a.name.local == name) {
        Some(attr) => attr.value = StrTendril::from_slice(value),
        None => attrs.push(Attribute {
            name: attribute_name(name),
            value: StrTendril::from_slice(value),
        }),
    }
}

/// Whitespace separated tokens of the `class` attribute
pub fn classes(node: &Handle) -> Vec<String> {
    attribute(node, "class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// New HTML element without children
pub fn new_element(name: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: attribute_name(name),
            value: StrTendril::from_slice(value),
        })
        .collect();
    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(name)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn new_comment(text: &str) -> Handle {
    Node::new(NodeData::Comment {
        contents: StrTendril::from_slice(text),
    })
}

/// Copy of `node` and its whole subtree, detached from the document
pub fn deep_clone(node: &Handle) -> Handle {
    let data = match &node.data {
        NodeData::Document => NodeData::Document,
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        NodeData::Element {
            name,
            attrs,
            template_contents,
            mathml_annotation_xml_integration_point,
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(template_contents.borrow().as_ref().map(deep_clone)),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::ProcessingInstruction { target, contents } => {
            NodeData::ProcessingInstruction {
                target: target.clone(),
                contents: contents.clone(),
            }
        }
    };
    let copy = Node::new(data);
    for child in node.children.borrow().iter() {
        let child = deep_clone(child);
        child.parent.set(Some(Rc::downgrade(&copy)));
        copy.children.borrow_mut().push(child);
    }
    copy
}

fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take()?;
    let parent = weak.upgrade();
    node.parent.set(Some(weak));
    parent
}

/// Insert `sibling` right after `node`; a detached `node` leaves it unused
pub fn insert_after(node: &Handle, sibling: Handle) {
    let Some(parent) = parent(node) else {
        return;
    };
    let mut children = parent.children.borrow_mut();
    let index = children
        .iter()
        .position(|c| Rc::ptr_eq(c, node))
        .map_or(children.len(), |i| i + 1);
    sibling.parent.set(Some(Rc::downgrade(&parent)));
    children.insert(index, sibling);
}

pub fn prepend_child(node: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(node)));
    node.children.borrow_mut().insert(0, child);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_attributes_are_decoded() {
        let document = Document::parse(
            r##"<p><a href="#Sheet&amp;2" title="Caf&eacute; &#x3E; 1" class='a  b' hidden>x</a></p>"##,
        );
        let anchor = document.first("a").unwrap();
        assert_eq!(attribute(&anchor, "href").as_deref(), Some("#Sheet&2"));
        assert_eq!(attribute(&anchor, "title").as_deref(), Some("Café > 1"));
        assert_eq!(classes(&anchor), vec!["a", "b"]);
        assert!(has_attribute(&anchor, "hidden"));
        assert_eq!(attribute(&anchor, "hidden").as_deref(), Some(""));
        assert!(!has_attribute(&anchor, "target"));
    }

    #[test]
    fn test_edits_are_serialized() {
        let document = Document::parse("<p><a href=\"#x\">x</a></p>");
        let anchor = document.first("a").unwrap();
        set_attribute(&anchor, "href", "#a&b");
        set_attribute(&anchor, "title", "say \"hi\"");
        insert_after(&anchor, deep_clone(&anchor));
        let paragraph = document.first("p").unwrap();
        prepend_child(&paragraph, new_element("br", &[]));
        prepend_child(&paragraph, new_comment(" note "));

        assert_eq!(
            document.to_html().unwrap(),
            "<html><head></head><body><p><!-- note --><br>\
             <a href=\"#a&amp;b\" title=\"say &quot;hi&quot;\">x</a>\
             <a href=\"#a&amp;b\" title=\"say &quot;hi&quot;\">x</a></p></body></html>"
        );
    }

    #[test]
    fn test_script_text_is_not_markup() {
        let html = "<html><head><script>var s = '<a href=\"#x\">' + '</a>';</script></head><body></body></html>";
        let document = Document::parse(html);
        assert!(document.elements("a").is_empty());
        assert_eq!(document.to_html().unwrap(), html);
    }

    #[test]
    fn test_merge_tokens() {
        assert_eq!(
            merge_tokens(["noopener", "noreferrer"], ["nofollow", "noopener"]),
            "noopener noreferrer nofollow"
        );
    }
}
