use crate::env::RenderEnv;
use crate::line_range::resolve_line_range;
use crate::security::is_safe_attribute_value;
use crate::token::Token;

pub const ATTR_LINE_START: &str = "data-source-line-start";
pub const ATTR_LINE_END: &str = "data-source-line-end";
pub const ATTR_TOKEN_IDX: &str = "data-token-idx";

/// Annotates every token once, before any rule runs.
///
/// Block tokens get 1-based source lines and their index in `tokens`; the
/// index is what a host uses to map a rendered region back to its token.
pub fn preprocess(tokens: &mut [Token], env: &RenderEnv) {
    for (idx, token) in tokens.iter_mut().enumerate() {
        prepare(token, env);
        if !token.block {
            continue;
        }
        if token.map.is_some() {
            let (start, end) = resolve_line_range(token, env);
            token.attr_set(ATTR_LINE_START, (start + 1).to_string());
            token.attr_set(ATTR_LINE_END, (end + 1).to_string());
        }
        token.attr_set(ATTR_TOKEN_IDX, idx.to_string());
        mirror_attrs(token);
    }
}

fn prepare(token: &mut Token, env: &RenderEnv) {
    token.meta_mut();
    if env.safe_mode {
        for (name, value) in token.attrs.iter_mut() {
            if !is_safe_attribute_value(name, value) {
                tracing::debug!(kind = %token.kind, attr = %name, "neutralizing unsafe attribute value");
                value.clear();
            }
        }
    }
    if let Some(children) = token.children.as_mut() {
        for child in children {
            prepare(child, env);
        }
    }
}

fn mirror_attrs(token: &mut Token) {
    let attrs = token
        .attrs
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    token.meta_mut().attrs = attrs;
}

/// True for the bookkeeping attributes the preprocessor adds.
pub fn is_source_attr(name: &str) -> bool {
    matches!(name, ATTR_LINE_START | ATTR_LINE_END | ATTR_TOKEN_IDX)
}
