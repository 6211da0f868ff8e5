use std::collections::{HashMap, HashSet};

use ammonia::Builder;

use crate::node::{Element, RenderNode};
use crate::security::{escape_text, is_valid_attribute_name};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "blockquote",
    "div",
    "figure",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "ol",
    "p",
    "pre",
    "table",
    "tbody",
    "thead",
    "tr",
    "ul",
];

/// Serializes a render forest to HTML. Text and attribute values are
/// escaped here and nowhere else.
pub fn to_html(nodes: &[RenderNode]) -> String {
    let mut writer = HtmlWriter::new();
    for node in nodes {
        writer.node(node);
    }
    writer.finish()
}

/// [`to_html`] followed by an allow-list pass.
pub fn to_html_sanitized(nodes: &[RenderNode]) -> String {
    let raw_html = to_html(nodes);

    let tags: HashSet<&'static str> = [
        "a",
        "abbr",
        "audio",
        "b",
        "blockquote",
        "br",
        "code",
        "dd",
        "del",
        "details",
        "div",
        "dl",
        "dt",
        "em",
        "figure",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "i",
        "img",
        "input",
        "kbd",
        "li",
        "ol",
        "p",
        "pre",
        "s",
        "source",
        "span",
        "strong",
        "sub",
        "summary",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "u",
        "ul",
        "video",
    ]
    .iter()
    .copied()
    .collect();

    let generic_attributes: HashSet<&'static str> = ["class", "id", "title"].iter().copied().collect();

    let mut tag_attributes = HashMap::new();
    tag_attributes.insert("a", ["href"].iter().copied().collect());
    tag_attributes.insert("img", ["alt", "src", "width", "height"].iter().copied().collect());
    tag_attributes.insert("ol", ["start"].iter().copied().collect());
    tag_attributes.insert("input", ["type", "checked", "disabled"].iter().copied().collect());
    tag_attributes.insert("td", ["style"].iter().copied().collect());
    tag_attributes.insert("th", ["style"].iter().copied().collect());
    tag_attributes.insert(
        "video",
        ["src", "poster", "controls", "controlslist", "width", "height"]
            .iter()
            .copied()
            .collect(),
    );
    tag_attributes.insert("audio", ["src", "controls", "controlslist"].iter().copied().collect());
    tag_attributes.insert("source", ["src", "type"].iter().copied().collect());

    let generic_attribute_prefixes: HashSet<&'static str> = ["data-"].iter().copied().collect();

    Builder::new()
        .tags(tags)
        .generic_attributes(generic_attributes)
        .tag_attributes(tag_attributes)
        .generic_attribute_prefixes(generic_attribute_prefixes)
        .clean(&raw_html)
        .to_string()
}

struct HtmlWriter {
    out: String,
}

impl HtmlWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn node(&mut self, node: &RenderNode) {
        match node {
            RenderNode::Text(text) => self.out.push_str(&escape_text(text)),
            RenderNode::Comment(text) => {
                // `--` cannot appear inside a comment body.
                self.out.push_str("<!--");
                self.out.push_str(&text.replace("--", "- -"));
                self.out.push_str("-->");
            }
            RenderNode::Fragment(children) => self.children(children),
            RenderNode::Element(element) => self.element(element),
            RenderNode::Component(component) => self.node(&component.render()),
            RenderNode::Deferred(deferred) => self.node(&deferred.snapshot()),
        }
    }

    fn children(&mut self, children: &[RenderNode]) {
        for child in children {
            self.node(child);
        }
    }

    fn element(&mut self, element: &Element) {
        if !is_valid_tag_name(&element.tag) {
            self.children(&element.children);
            return;
        }
        self.out.push('<');
        self.out.push_str(&element.tag);
        for (name, value) in element.attrs.iter() {
            if !is_valid_attribute_name(name) {
                continue;
            }
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape_text(value));
            self.out.push('"');
        }
        self.out.push('>');

        let tag = element.tag.to_ascii_lowercase();
        if VOID_ELEMENTS.contains(&tag.as_str()) {
            if tag == "hr" {
                self.out.push('\n');
            }
            return;
        }
        self.children(&element.children);
        self.out.push_str("</");
        self.out.push_str(&element.tag);
        self.out.push('>');
        if BLOCK_ELEMENTS.contains(&tag.as_str()) {
            self.out.push('\n');
        }
    }

    fn finish(mut self) -> String {
        while self.out.ends_with('\n') {
            self.out.pop();
        }
        self.out
    }
}

fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == ':')
}
