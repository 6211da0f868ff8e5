use serde::Serialize;

use crate::deferred::DeferredNode;
use crate::fence::ComponentNode;

/// Framework-agnostic output of a compile pass.
///
/// Nodes are plain values: once produced they are never mutated by the
/// compiler and carry no mount state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderNode {
    Element(Element),
    Text(String),
    Comment(String),
    Fragment(Vec<RenderNode>),
    Component(ComponentNode),
    Deferred(DeferredNode),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Element {
    pub tag: String,
    pub attrs: Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<EventHandler>,
    pub children: Vec<RenderNode>,
}

/// Ordered attribute list; names are unique, insertion order is kept.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Attributes(Vec<(String, String)>);

/// Declarative event binding; the host maps `action` to real behavior.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EventHandler {
    pub event: String,
    pub action: HandlerAction,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerAction {
    /// Pause the media element when it is no longer attached to the
    /// document, otherwise scroll it into view.
    PauseIfDetachedElseScrollIntoView,
}

impl RenderNode {
    pub fn element(tag: impl Into<String>) -> Element {
        Element::new(tag)
    }

    pub fn text(text: impl Into<String>) -> Self {
        RenderNode::Text(text.into())
    }

    pub fn empty() -> Self {
        RenderNode::Fragment(Vec::new())
    }

    /// Element and Fragment nodes accept children from the tree builder.
    pub fn is_container(&self) -> bool {
        matches!(self, RenderNode::Element(_) | RenderNode::Fragment(_))
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Element(element) => &element.children,
            RenderNode::Fragment(children) => children,
            _ => &[],
        }
    }

    pub(crate) fn append_children(&mut self, mut extra: Vec<RenderNode>) {
        match self {
            RenderNode::Element(element) => element.children.append(&mut extra),
            RenderNode::Fragment(children) => children.append(&mut extra),
            _ => {}
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            RenderNode::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.as_element().map(|element| element.tag.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.as_element().and_then(|element| element.attrs.get(name))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &RenderNode, out: &mut String) {
    match node {
        RenderNode::Text(text) => out.push_str(text),
        RenderNode::Element(_) | RenderNode::Fragment(_) => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
        _ => {}
    }
}

impl From<Element> for RenderNode {
    fn from(element: Element) -> Self {
        RenderNode::Element(element)
    }
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.set(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<RenderNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_children(mut self, children: Vec<RenderNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_handler(mut self, event: impl Into<String>, action: HandlerAction) -> Self {
        self.handlers.push(EventHandler {
            event: event.into(),
            action,
        });
        self
    }
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Appends without the uniqueness check; for callers that already know
    /// the name is new.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.0.iter().position(|(key, _)| key == name)?;
        Some(self.0.remove(index).1)
    }

    /// Adds `class` to the class list unless it is already present.
    pub fn merge_class(&mut self, class: &str) {
        match self.0.iter_mut().find(|(key, _)| key == "class") {
            Some((_, value)) => {
                if !value.split_whitespace().any(|existing| existing == class) {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(class);
                }
            }
            None => self.0.push(("class".to_string(), class.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (key, value) in iter {
            attrs.set(key, value);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::{Attributes, Element, RenderNode};

    #[test]
    fn merge_class_appends_once() {
        let mut attrs: Attributes = [("class", "hljs")].into_iter().collect();
        attrs.merge_class("language-js");
        attrs.merge_class("language-js");
        assert_eq!(attrs.get("class"), Some("hljs language-js"));
    }

    #[test]
    fn text_content_flattens_nested_nodes() {
        let node: RenderNode = Element::new("p")
            .with_child(RenderNode::text("a"))
            .with_child(RenderNode::Fragment(vec![
                Element::new("em").with_child(RenderNode::text("b")).into(),
                RenderNode::Comment("hidden".to_string()),
            ]))
            .into();
        assert_eq!(node.text_content(), "ab");
    }
}
