mod compiler;
mod deferred;
mod env;
mod error;
mod fence;
mod html;
mod line_range;
mod markup;
mod node;
mod preprocess;
mod rules;
mod security;
mod source_map;
mod token;
mod tokenize;

pub use compiler::{CompileOptions, Compiler};
pub use deferred::{DeferredConfig, DeferredNode, SlotState};
pub use env::{MacroLine, RenderEnv};
pub use error::{OverrideError, RenderError, TokenError};
pub use fence::{
    CodeBlockComponent, CodeBlockMeta, CodeBlockProps, CodeBlockResolver, ComponentDescriptor,
    ComponentNode, ComponentRef, DefaultFence, Fallback, Highlighter, Override, component_key,
    parse_fence_info, render_fence,
};
pub use html::{to_html, to_html_sanitized};
pub use line_range::resolve_line_range;
pub use markup::{MarkupCache, MarkupPolicy, parse_markup};
pub use node::{Attributes, Element, EventHandler, HandlerAction, RenderNode};
pub use preprocess::{ATTR_LINE_END, ATTR_LINE_START, ATTR_TOKEN_IDX, is_source_attr, preprocess};
pub use rules::{Rule, RuleOutput, RuleTable, checked_attrs, render_inline_as_text, valid_attrs};
pub use security::{
    DANGEROUS_ELEMENTS, SENSITIVE_ATTRIBUTES, escape_text, is_dangerous_element,
    is_safe_attribute_value, is_sensitive_attribute, is_valid_attribute_name,
    sanitize_markup_fragment, unescape_entities,
};
pub use source_map::{Position, SourceMap};
pub use token::{Nesting, Token, TokenMeta};
pub use tokenize::{TokenizeOptions, tokenize};

/// Parses a markdown-it token dump (a JSON array of tokens).
pub fn tokens_from_json(json: &str) -> Result<Vec<Token>, TokenError> {
    Ok(serde_json::from_str(json)?)
}

/// Tokenizes `source` and compiles it with `compiler`, filling the line
/// marks of `env` from the source text.
pub fn compile_markdown(
    compiler: &Compiler,
    source: &str,
    tokenize_options: &TokenizeOptions,
    env: RenderEnv,
) -> Vec<RenderNode> {
    let mut tokens = tokenize(source, tokenize_options);
    let env = env.with_line_marks(source);
    compiler.compile(&mut tokens, &env)
}
