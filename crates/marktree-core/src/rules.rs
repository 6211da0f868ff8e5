use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::compiler::{CompileOptions, Compiler};
use crate::env::RenderEnv;
use crate::fence::render_fence;
use crate::node::{Attributes, Element, HandlerAction, RenderNode};
use crate::preprocess::is_source_attr;
use crate::security::{is_safe_attribute_value, is_valid_attribute_name};
use crate::token::Token;

/// Renders `tokens[idx]`. Rules see the whole stream so they can look at
/// neighbours, and the compiler so they can compile nested tokens.
pub type Rule = Arc<
    dyn Fn(&[Token], usize, &CompileOptions, &RenderEnv, &Compiler) -> RuleOutput + Send + Sync,
>;

#[derive(Debug)]
pub enum RuleOutput {
    Node(RenderNode),
    /// Several siblings, wrapped in a fragment by the tree builder.
    Nodes(Vec<RenderNode>),
    /// Raw markup to parse and splice in. Never treated as text.
    Markup(String),
    /// `node` is emitted; `parent` becomes its last child and receives the
    /// children of an opening token instead of `node`.
    Nested { node: RenderNode, parent: RenderNode },
    Suppress,
}

impl From<RenderNode> for RuleOutput {
    fn from(node: RenderNode) -> Self {
        RuleOutput::Node(node)
    }
}

impl From<Element> for RuleOutput {
    fn from(element: Element) -> Self {
        RuleOutput::Node(element.into())
    }
}

impl From<Option<RenderNode>> for RuleOutput {
    fn from(node: Option<RenderNode>) -> Self {
        node.map_or(RuleOutput::Suppress, RuleOutput::Node)
    }
}

/// Token type to rule. Types without an entry get the generic render.
#[derive(Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Rule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert("text", text);
        table.insert("hardbreak", hardbreak);
        table.insert("softbreak", softbreak);
        table.insert("image", image);
        table.insert("audio", media);
        table.insert("video", media);
        table.insert("code_inline", code_inline);
        table.insert("code_block", code_block);
        table.insert("fence", fence);
        table.insert("html_block", raw_html);
        table.insert("html_inline", raw_html);
        table
    }

    /// Registers `rule` for `kind`, returning the rule it replaced.
    pub fn insert<F>(&mut self, kind: impl Into<String>, rule: F) -> Option<Rule>
    where
        F: Fn(&[Token], usize, &CompileOptions, &RenderEnv, &Compiler) -> RuleOutput
            + Send
            + Sync
            + 'static,
    {
        self.insert_rule(kind, Arc::new(rule))
    }

    pub fn insert_rule(&mut self, kind: impl Into<String>, rule: Rule) -> Option<Rule> {
        self.rules.insert(kind.into(), rule)
    }

    pub fn remove(&mut self, kind: &str) -> Option<Rule> {
        self.rules.remove(kind)
    }

    pub fn get(&self, kind: &str) -> Option<&Rule> {
        self.rules.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.rules.contains_key(kind)
    }

    /// Registered token types, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Flattens inline tokens to plain text, ignoring markup.
pub fn render_inline_as_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    collect_inline_text(tokens, &mut out);
    out
}

fn collect_inline_text(tokens: &[Token], out: &mut String) {
    for token in tokens {
        match token.kind.as_str() {
            "text" | "code_inline" => out.push_str(&token.content),
            "softbreak" | "hardbreak" => out.push('\n'),
            _ => {
                if let Some(children) = &token.children {
                    collect_inline_text(children, out);
                }
            }
        }
    }
}

/// Token attributes with invalid names dropped; values kept verbatim.
pub fn valid_attrs(token: &Token) -> Attributes {
    token
        .attrs
        .iter()
        .filter(|(name, _)| is_valid_attribute_name(name))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}

/// Token attributes that pass both the name and the value check.
pub fn checked_attrs(token: &Token) -> Attributes {
    token
        .attrs
        .iter()
        .filter(|(name, value)| is_valid_attribute_name(name) && is_safe_attribute_value(name, value))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}

fn text(tokens: &[Token], idx: usize, _: &CompileOptions, _: &RenderEnv, _: &Compiler) -> RuleOutput {
    RenderNode::text(tokens[idx].content.as_str()).into()
}

fn hardbreak(_: &[Token], _: usize, _: &CompileOptions, _: &RenderEnv, _: &Compiler) -> RuleOutput {
    Element::new("br").into()
}

fn softbreak(
    _: &[Token],
    _: usize,
    options: &CompileOptions,
    _: &RenderEnv,
    _: &Compiler,
) -> RuleOutput {
    if options.breaks {
        Element::new("br").into()
    } else {
        RuleOutput::Suppress
    }
}

fn image(tokens: &[Token], idx: usize, _: &CompileOptions, _: &RenderEnv, _: &Compiler) -> RuleOutput {
    let token = &tokens[idx];
    let alt = token
        .children
        .as_deref()
        .map(render_inline_as_text)
        .unwrap_or_default();
    let mut attrs = checked_attrs(token);
    attrs.set("alt", alt);
    Element::new("img").with_attrs(attrs).into()
}

fn media(tokens: &[Token], idx: usize, _: &CompileOptions, _: &RenderEnv, _: &Compiler) -> RuleOutput {
    let token = &tokens[idx];
    let tag = if token.tag.is_empty() {
        token.kind.as_str()
    } else {
        token.tag.as_str()
    };
    let mut attrs = checked_attrs(token);
    attrs.set("controls", "true");
    attrs.set("controlsList", "nodownload");
    Element::new(tag)
        .with_attrs(attrs)
        .with_handler(
            "leavepictureinpicture",
            HandlerAction::PauseIfDetachedElseScrollIntoView,
        )
        .into()
}

fn code_inline(
    tokens: &[Token],
    idx: usize,
    _: &CompileOptions,
    _: &RenderEnv,
    _: &Compiler,
) -> RuleOutput {
    let token = &tokens[idx];
    let attrs: Attributes = token
        .attrs
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    Element::new("code")
        .with_attrs(attrs)
        .with_child(RenderNode::text(token.content.as_str()))
        .into()
}

fn code_block(
    tokens: &[Token],
    idx: usize,
    _: &CompileOptions,
    _: &RenderEnv,
    _: &Compiler,
) -> RuleOutput {
    let token = &tokens[idx];
    let mut pre_attrs = Attributes::new();
    let mut code_attrs = Attributes::new();
    for (name, value) in &token.attrs {
        if !is_valid_attribute_name(name) {
            continue;
        }
        if is_source_attr(name) {
            pre_attrs.set(name.as_str(), value.as_str());
        } else {
            code_attrs.set(name.as_str(), value.as_str());
        }
    }
    Element::new("pre")
        .with_attrs(pre_attrs)
        .with_child(
            Element::new("code")
                .with_attrs(code_attrs)
                .with_child(RenderNode::text(token.content.as_str())),
        )
        .into()
}

fn fence(
    tokens: &[Token],
    idx: usize,
    options: &CompileOptions,
    _: &RenderEnv,
    _: &Compiler,
) -> RuleOutput {
    render_fence(&tokens[idx], options).into()
}

fn raw_html(tokens: &[Token], idx: usize, _: &CompileOptions, _: &RenderEnv, _: &Compiler) -> RuleOutput {
    let token = &tokens[idx];
    match token.meta.as_ref().and_then(|meta| meta.node.as_ref()) {
        Some(node) => RuleOutput::Node(node.clone()),
        None => RuleOutput::Markup(token.content.clone()),
    }
}
