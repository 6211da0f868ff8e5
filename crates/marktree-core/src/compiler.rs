use std::fmt;
use std::sync::Arc;

use crate::deferred::DeferredConfig;
use crate::env::RenderEnv;
use crate::fence::{CodeBlockResolver, Highlighter};
use crate::markup::{MarkupCache, MarkupPolicy};
use crate::node::{Element, RenderNode};
use crate::preprocess::preprocess;
use crate::rules::{Rule, RuleOutput, RuleTable, valid_attrs};
use crate::token::{Nesting, Token};

/// Host configuration for a [`Compiler`].
#[derive(Clone)]
pub struct CompileOptions {
    /// Render soft line breaks as `<br>`.
    pub breaks: bool,
    /// Prefix of the language class on fenced code.
    pub lang_prefix: String,
    pub highlight: Option<Arc<dyn Highlighter>>,
    pub code_block: Option<Arc<dyn CodeBlockResolver>>,
    pub deferred: DeferredConfig,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            breaks: false,
            lang_prefix: "language-".to_string(),
            highlight: None,
            code_block: None,
            deferred: DeferredConfig::default(),
        }
    }
}

impl CompileOptions {
    pub fn with_breaks(mut self, breaks: bool) -> Self {
        self.breaks = breaks;
        self
    }

    pub fn with_lang_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lang_prefix = prefix.into();
        self
    }

    pub fn with_highlight(mut self, highlighter: impl Highlighter + 'static) -> Self {
        self.highlight = Some(Arc::new(highlighter));
        self
    }

    pub fn with_code_block(mut self, resolver: impl CodeBlockResolver + 'static) -> Self {
        self.code_block = Some(Arc::new(resolver));
        self
    }

    pub fn with_deferred(mut self, deferred: DeferredConfig) -> Self {
        self.deferred = deferred;
        self
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("breaks", &self.breaks)
            .field("lang_prefix", &self.lang_prefix)
            .field("highlight", &self.highlight.is_some())
            .field("code_block", &self.code_block.is_some())
            .field("deferred", &self.deferred)
            .finish()
    }
}

/// Token stream to render tree compiler.
#[derive(Clone, Debug)]
pub struct Compiler {
    options: CompileOptions,
    rules: RuleTable,
    markup: Arc<MarkupCache>,
}

/// One produced node plus the tree bookkeeping for it.
struct Slot {
    node: Option<RenderNode>,
    children: Vec<usize>,
    attached: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            rules: RuleTable::with_defaults(),
            markup: Arc::new(MarkupCache::default()),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleTable {
        &mut self.rules
    }

    /// Adds or replaces the rule for a token type.
    pub fn register<F>(&mut self, kind: impl Into<String>, rule: F) -> Option<Rule>
    where
        F: Fn(&[Token], usize, &CompileOptions, &RenderEnv, &Compiler) -> RuleOutput
            + Send
            + Sync
            + 'static,
    {
        self.rules.insert(kind, rule)
    }

    /// Annotates `tokens` in place and builds the render forest.
    pub fn compile(&self, tokens: &mut [Token], env: &RenderEnv) -> Vec<RenderNode> {
        let span = tracing::debug_span!("compile", tokens = tokens.len(), safe = env.safe_mode);
        let _guard = span.enter();

        preprocess(tokens, env);
        let nodes = self.build(tokens, env);
        tracing::debug!(nodes = nodes.len(), "compiled token stream");
        nodes
    }

    /// Builds a forest from already preprocessed tokens, such as the
    /// children of an `inline` token.
    pub fn compile_inline(&self, tokens: &[Token], env: &RenderEnv) -> Vec<RenderNode> {
        self.build(tokens, env)
    }

    /// Render used for token types without a rule.
    pub fn render_token(&self, tokens: &[Token], idx: usize) -> Option<RenderNode> {
        let token = tokens.get(idx)?;
        if token.nesting == Nesting::Closing {
            return None;
        }
        if token.hidden {
            return Some(RenderNode::empty());
        }
        match token.tag.as_str() {
            "--" => Some(RenderNode::Comment(token.content.clone())),
            "" => Some(RenderNode::empty()),
            tag => Some(Element::new(tag).with_attrs(valid_attrs(token)).into()),
        }
    }

    fn build(&self, tokens: &[Token], env: &RenderEnv) -> Vec<RenderNode> {
        let mut arena: Vec<Slot> = Vec::with_capacity(tokens.len());
        // `None` marks an opening token that rendered nothing; it still has
        // to be popped by its closer.
        let mut stack: Vec<Option<usize>> = Vec::new();

        for (idx, token) in tokens.iter().enumerate() {
            let (node, inner) = match self.render(tokens, idx, env) {
                Some((node, inner)) => (Some(node), inner),
                None => (None, None),
            };

            let mut container = None;
            if let Some(node) = node {
                let id = push_slot(&mut arena, node);
                attach_to_open(&mut arena, &stack, id);
                container = Some(id);
                if let Some(inner) = inner {
                    let inner_id = push_slot(&mut arena, inner);
                    if is_container(&arena, id) {
                        arena[id].children.push(inner_id);
                        arena[inner_id].attached = true;
                    } else {
                        // A leaf cannot hold the nested parent; it follows as a sibling.
                        tracing::trace!(idx, kind = %token.kind, "nested parent under a leaf node");
                        attach_to_open(&mut arena, &stack, inner_id);
                    }
                    container = Some(inner_id);
                }
            }

            match token.nesting {
                Nesting::Opening => stack.push(container),
                Nesting::Closing => {
                    if stack.pop().is_none() {
                        tracing::trace!(idx, kind = %token.kind, "ignoring unmatched closing token");
                    }
                }
                Nesting::SelfClosing => {}
            }
        }

        assemble(arena)
    }

    fn render(
        &self,
        tokens: &[Token],
        idx: usize,
        env: &RenderEnv,
    ) -> Option<(RenderNode, Option<RenderNode>)> {
        let token = &tokens[idx];
        if token.is_inline_container() {
            let children = token.children.as_deref().unwrap_or_default();
            return Some((RenderNode::Fragment(self.compile_inline(children, env)), None));
        }
        let Some(rule) = self.rules.get(&token.kind) else {
            return self.render_token(tokens, idx).map(|node| (node, None));
        };
        match rule(tokens, idx, &self.options, env, self) {
            RuleOutput::Node(node) => Some((node, None)),
            RuleOutput::Nodes(nodes) => Some((RenderNode::Fragment(nodes), None)),
            RuleOutput::Markup(raw) => {
                let policy = if env.safe_mode {
                    MarkupPolicy::Safe
                } else {
                    MarkupPolicy::Standard
                };
                let mut nodes = self.markup.parse(&raw, policy);
                let node = if nodes.len() == 1 {
                    nodes.remove(0)
                } else {
                    RenderNode::Fragment(nodes)
                };
                Some((node, None))
            }
            RuleOutput::Nested { node, parent } => Some((node, Some(parent))),
            RuleOutput::Suppress => None,
        }
    }
}

fn is_container(arena: &[Slot], id: usize) -> bool {
    arena[id].node.as_ref().is_some_and(RenderNode::is_container)
}

/// Hangs `id` under the innermost open node, if that node takes children.
fn attach_to_open(arena: &mut [Slot], stack: &[Option<usize>], id: usize) {
    if let Some(Some(top)) = stack.last().copied() {
        if is_container(arena, top) {
            arena[top].children.push(id);
            arena[id].attached = true;
        }
    }
}

fn push_slot(arena: &mut Vec<Slot>, node: RenderNode) -> usize {
    arena.push(Slot {
        node: Some(node),
        children: Vec::new(),
        attached: false,
    });
    arena.len() - 1
}

/// Children always sit at higher indices than their parent, so walking the
/// arena backwards finishes every subtree before it is moved into its owner.
fn assemble(mut arena: Vec<Slot>) -> Vec<RenderNode> {
    for id in (0..arena.len()).rev() {
        let child_ids = std::mem::take(&mut arena[id].children);
        if child_ids.is_empty() {
            continue;
        }
        let children: Vec<RenderNode> = child_ids
            .into_iter()
            .filter_map(|child| arena[child].node.take())
            .collect();
        if let Some(node) = arena[id].node.as_mut() {
            node.append_children(children);
        }
    }
    arena
        .into_iter()
        .filter(|slot| !slot.attached)
        .filter_map(|slot| slot.node)
        .collect()
}
