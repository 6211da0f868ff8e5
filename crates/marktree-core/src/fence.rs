//! Fenced code blocks and rich-block overrides.
//!
//! A fence is rendered in one of three ways: by a host component returned
//! from the configured [`CodeBlockResolver`], by a deferred loader, or by the
//! [`DefaultFence`] render. Every failure along the override path ends in the
//! default render; nothing here propagates an error to `compile`.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};

use crate::compiler::CompileOptions;
use crate::deferred::DeferredNode;
use crate::error::{OverrideError, RenderError, panic_message};
use crate::markup::{MarkupPolicy, parse_markup};
use crate::node::{Attributes, Element, RenderNode};
use crate::preprocess::is_source_attr;
use crate::security::is_valid_attribute_name;
use crate::token::Token;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Everything a resolver knows about one fenced block.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CodeBlockMeta {
    pub lang_name: String,
    pub lang_attrs: String,
    pub content: String,
    pub attrs: BTreeMap<String, String>,
    pub info: String,
    #[serde(skip)]
    pub source_token: Token,
}

impl CodeBlockMeta {
    pub fn from_token(token: &Token) -> Self {
        let (lang_name, lang_attrs) = parse_fence_info(&token.info);
        let attrs = match &token.meta {
            Some(meta) if !meta.attrs.is_empty() => meta.attrs.clone(),
            _ => token.attrs.iter().cloned().collect(),
        };
        Self {
            lang_name,
            lang_attrs,
            content: token.content.clone(),
            attrs,
            info: token.info.clone(),
            source_token: token.clone(),
        }
    }
}

/// Splits a fence info string into language and trailing attributes.
pub fn parse_fence_info(info: &str) -> (String, String) {
    let info = info.trim();
    match info.split_once(char::is_whitespace) {
        Some((lang, rest)) => (lang.trim().to_string(), rest.trim().to_string()),
        None => (info.to_string(), String::new()),
    }
}

/// Turns code into pre-escaped markup. `None` means "escape it yourself".
pub trait Highlighter: Send + Sync {
    fn highlight(&self, code: &str, lang: &str, attrs: &str) -> Option<String>;
}

impl<F> Highlighter for F
where
    F: Fn(&str, &str, &str) -> Option<String> + Send + Sync,
{
    fn highlight(&self, code: &str, lang: &str, attrs: &str) -> Option<String> {
        self(code, lang, attrs)
    }
}

/// Host hook that may replace the default render of a fenced block.
pub trait CodeBlockResolver: Send + Sync {
    fn resolve(&self, meta: &CodeBlockMeta) -> Result<Option<Override>, OverrideError>;
}

impl<F> CodeBlockResolver for F
where
    F: Fn(&CodeBlockMeta) -> Result<Option<Override>, OverrideError> + Send + Sync,
{
    fn resolve(&self, meta: &CodeBlockMeta) -> Result<Option<Override>, OverrideError> {
        self(meta)
    }
}

/// A synchronous rich-block renderer.
pub trait CodeBlockComponent: Send + Sync {
    fn name(&self) -> &str {
        "code-block"
    }

    fn render(&self, props: &CodeBlockProps) -> Result<RenderNode, RenderError>;
}

impl<F> CodeBlockComponent for F
where
    F: Fn(&CodeBlockProps) -> Result<RenderNode, RenderError> + Send + Sync,
{
    fn render(&self, props: &CodeBlockProps) -> Result<RenderNode, RenderError> {
        self(props)
    }
}

/// Component reference the host resolves by name at mount time.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ComponentDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub props: serde_json::Map<String, serde_json::Value>,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: serde_json::Map::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

/// What a resolver hands back for a block it wants to own.
pub enum Override {
    Component(Arc<dyn CodeBlockComponent>),
    Descriptor(ComponentDescriptor),
    Deferred(BoxFuture<'static, Result<RenderNode, OverrideError>>),
}

impl Override {
    pub fn component(component: impl CodeBlockComponent + 'static) -> Self {
        Override::Component(Arc::new(component))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<RenderNode, OverrideError>> + Send + 'static,
    {
        Override::Deferred(Box::pin(future))
    }
}

impl fmt::Debug for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Override::Component(component) => {
                f.debug_tuple("Component").field(&component.name()).finish()
            }
            Override::Descriptor(descriptor) => {
                f.debug_tuple("Descriptor").field(descriptor).finish()
            }
            Override::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The escaped or highlighted `pre > code` render.
#[derive(Clone, Default)]
pub struct DefaultFence {
    pub lang_prefix: String,
    pub highlight: Option<Arc<dyn Highlighter>>,
}

impl DefaultFence {
    pub fn from_options(options: &CompileOptions) -> Self {
        Self {
            lang_prefix: options.lang_prefix.clone(),
            highlight: options.highlight.clone(),
        }
    }

    pub fn render(&self, meta: &CodeBlockMeta) -> RenderNode {
        let token = &meta.source_token;
        let highlighted = self.highlight_code(meta);

        if let Some(markup) = &highlighted {
            if markup.starts_with("<pre") {
                let mut nodes = parse_markup(markup, MarkupPolicy::Trusted);
                return if nodes.len() == 1 {
                    nodes.remove(0)
                } else {
                    RenderNode::Fragment(nodes)
                };
            }
        }

        let mut pre_attrs = Attributes::new();
        pre_attrs.set("data-info", meta.info.as_str());
        pre_attrs.set("data-lang", meta.lang_name.as_str());
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
        if !meta.lang_name.is_empty() {
            code_attrs.merge_class(&format!("{}{}", self.lang_prefix, meta.lang_name));
        }

        let children = match highlighted {
            Some(markup) => parse_markup(&markup, MarkupPolicy::Trusted),
            None => vec![RenderNode::text(meta.content.as_str())],
        };
        Element::new("pre")
            .with_attrs(pre_attrs)
            .with_child(Element::new("code").with_attrs(code_attrs).with_children(children))
            .into()
    }

    fn highlight_code(&self, meta: &CodeBlockMeta) -> Option<String> {
        let highlighter = self.highlight.as_ref()?;
        let result = catch_unwind(AssertUnwindSafe(|| {
            highlighter.highlight(&meta.content, &meta.lang_name, &meta.lang_attrs)
        }));
        match result {
            Ok(markup) => markup.filter(|markup| !markup.is_empty()),
            Err(payload) => {
                tracing::warn!(
                    lang = %meta.lang_name,
                    panic = %panic_message(&*payload),
                    "highlighter panicked; escaping code"
                );
                None
            }
        }
    }
}

impl fmt::Debug for DefaultFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultFence")
            .field("lang_prefix", &self.lang_prefix)
            .field("highlight", &self.highlight.is_some())
            .finish()
    }
}

/// Default render of one block, computed on first use and shared by clones.
#[derive(Clone)]
pub struct Fallback {
    inner: Arc<FallbackInner>,
}

struct FallbackInner {
    meta: Arc<CodeBlockMeta>,
    fence: DefaultFence,
    rendered: OnceCell<RenderNode>,
}

impl Fallback {
    pub fn new(meta: Arc<CodeBlockMeta>, fence: DefaultFence) -> Self {
        Self {
            inner: Arc::new(FallbackInner {
                meta,
                fence,
                rendered: OnceCell::new(),
            }),
        }
    }

    pub fn meta(&self) -> &CodeBlockMeta {
        &self.inner.meta
    }

    pub fn render(&self) -> RenderNode {
        self.inner
            .rendered
            .get_or_init(|| self.inner.fence.render(&self.inner.meta))
            .clone()
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field("lang", &self.inner.meta.lang_name)
            .field("rendered", &self.inner.rendered.get().is_some())
            .finish()
    }
}

/// Props handed to a rich-block component.
#[derive(Clone, Debug)]
pub struct CodeBlockProps {
    pub meta: Arc<CodeBlockMeta>,
    pub key: String,
    pub fallback: Fallback,
}

#[derive(Clone)]
pub enum ComponentRef {
    Component(Arc<dyn CodeBlockComponent>),
    Descriptor(ComponentDescriptor),
}

impl ComponentRef {
    pub fn name(&self) -> &str {
        match self {
            ComponentRef::Component(component) => component.name(),
            ComponentRef::Descriptor(descriptor) => &descriptor.name,
        }
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRef::Component(component) => {
                f.debug_tuple("Component").field(&component.name()).finish()
            }
            ComponentRef::Descriptor(descriptor) => {
                f.debug_tuple("Descriptor").field(descriptor).finish()
            }
        }
    }
}

impl PartialEq for ComponentRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ComponentRef::Component(a), ComponentRef::Component(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            (ComponentRef::Descriptor(a), ComponentRef::Descriptor(b)) => a == b,
            _ => false,
        }
    }
}

/// A rich-block instance in the render tree.
#[derive(Clone, Debug)]
pub struct ComponentNode {
    pub component: ComponentRef,
    pub props: CodeBlockProps,
}

impl ComponentNode {
    pub fn key(&self) -> &str {
        &self.props.key
    }

    /// Runs the component, or the default render when it fails.
    ///
    /// Descriptors are mounted by the host; here they render as their
    /// fallback.
    pub fn render(&self) -> RenderNode {
        let ComponentRef::Component(component) = &self.component else {
            return self.props.fallback.render();
        };
        match catch_unwind(AssertUnwindSafe(|| component.render(&self.props))) {
            Ok(Ok(node)) => node,
            Ok(Err(err)) => {
                tracing::warn!(key = %self.props.key, error = %err, "component failed; using default render");
                self.props.fallback.render()
            }
            Err(payload) => {
                let err = RenderError::Panicked(panic_message(&*payload));
                tracing::warn!(key = %self.props.key, error = %err, "component failed; using default render");
                self.props.fallback.render()
            }
        }
    }
}

impl PartialEq for ComponentNode {
    fn eq(&self, other: &Self) -> bool {
        self.props.key == other.props.key && self.component == other.component
    }
}

impl Serialize for ComponentNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ComponentNode", 3)?;
        state.serialize_field("component", self.component.name())?;
        state.serialize_field("key", &self.props.key)?;
        state.serialize_field("props", &*self.props.meta)?;
        state.end()
    }
}

/// Key for one block instance: `{lang}-{n}`, unique within the process.
pub fn component_key(lang: &str) -> String {
    let n = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    let lang = if lang.is_empty() { "code" } else { lang };
    format!("{lang}-{n}")
}

/// The `fence` rule body.
pub fn render_fence(token: &Token, options: &CompileOptions) -> RenderNode {
    let meta = Arc::new(CodeBlockMeta::from_token(token));
    let fallback = Fallback::new(Arc::clone(&meta), DefaultFence::from_options(options));
    let Some(resolver) = options.code_block.as_ref() else {
        return fallback.render();
    };

    let resolved = catch_unwind(AssertUnwindSafe(|| resolver.resolve(&meta)))
        .unwrap_or_else(|payload| Err(OverrideError::Panicked(panic_message(&*payload))));
    let node = resolved.and_then(|found| match found {
        Some(found) => into_node(found, &meta, &fallback, options).map(Some),
        None => Ok(None),
    });
    match node {
        Ok(Some(node)) => node,
        Ok(None) => fallback.render(),
        Err(err) => {
            tracing::warn!(lang = %meta.lang_name, error = %err, "code block override failed; using default render");
            fallback.render()
        }
    }
}

fn into_node(
    found: Override,
    meta: &Arc<CodeBlockMeta>,
    fallback: &Fallback,
    options: &CompileOptions,
) -> Result<RenderNode, OverrideError> {
    let props = || CodeBlockProps {
        meta: Arc::clone(meta),
        key: component_key(&meta.lang_name),
        fallback: fallback.clone(),
    };
    match found {
        Override::Component(component) => Ok(RenderNode::Component(ComponentNode {
            component: ComponentRef::Component(component),
            props: props(),
        })),
        Override::Descriptor(descriptor) => {
            if descriptor.name.trim().is_empty() {
                return Err(OverrideError::UnnamedDescriptor);
            }
            Ok(RenderNode::Component(ComponentNode {
                component: ComponentRef::Descriptor(descriptor),
                props: props(),
            }))
        }
        Override::Deferred(future) => Ok(RenderNode::Deferred(DeferredNode::new(
            component_key(&meta.lang_name),
            future,
            fallback.clone(),
            options.deferred.clone(),
        ))),
    }
}
