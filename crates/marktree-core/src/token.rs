use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TokenError;
use crate::node::RenderNode;

/// Open/close marker carried by every token.
///
/// The flat token stream encodes the document tree only through this value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Nesting {
    Closing,
    #[default]
    SelfClosing,
    Opening,
}

impl TryFrom<i8> for Nesting {
    type Error = TokenError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Nesting::Closing),
            0 => Ok(Nesting::SelfClosing),
            1 => Ok(Nesting::Opening),
            other => Err(TokenError::InvalidNesting(other)),
        }
    }
}

impl From<Nesting> for i8 {
    fn from(value: Nesting) -> Self {
        match value {
            Nesting::Closing => -1,
            Nesting::SelfClosing => 0,
            Nesting::Opening => 1,
        }
    }
}

/// One unit of a pre-parsed Markdown document, in the markdown-it shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attrs: Vec<(String, String)>,
    /// Raw source span: 0-based start line, exclusive end line.
    pub map: Option<(usize, usize)>,
    pub nesting: Nesting,
    pub level: i32,
    pub children: Option<Vec<Token>>,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub markup: String,
    #[serde(deserialize_with = "null_as_default")]
    pub info: String,
    pub meta: Option<TokenMeta>,
    pub block: bool,
    pub hidden: bool,
}

/// Mutable side-channel attached to a token during a compile pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMeta {
    /// Attribute mirror written by the preprocessor.
    pub attrs: BTreeMap<String, String>,
    /// Node computed by an upstream step; html rules return it verbatim.
    #[serde(skip)]
    pub node: Option<RenderNode>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Token {
    pub fn new(kind: impl Into<String>, tag: impl Into<String>, nesting: Nesting) -> Self {
        Self {
            kind: kind.into(),
            tag: tag.into(),
            nesting,
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_map(mut self, start: usize, end: usize) -> Self {
        self.map = Some((start, end));
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attr_set(name, value);
        self
    }

    pub fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }

    pub fn block(mut self) -> Self {
        self.block = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.attrs.iter().position(|(key, _)| key == name)
    }

    pub fn attr_get(&self, name: &str) -> Option<&str> {
        self.attr_index(name)
            .map(|index| self.attrs[index].1.as_str())
    }

    /// Replaces the value in place, or appends when the name is new.
    pub fn attr_set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attr_index(&name) {
            Some(index) => self.attrs[index].1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Appends without checking for an existing entry.
    pub fn attr_push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.push((name.into(), value.into()));
    }

    /// Joins `value` onto an existing attribute with a space.
    pub fn attr_join(&mut self, name: &str, value: &str) {
        match self.attr_index(name) {
            Some(index) => {
                let existing = &mut self.attrs[index].1;
                if !existing.is_empty() {
                    existing.push(' ');
                }
                existing.push_str(value);
            }
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn meta_mut(&mut self) -> &mut TokenMeta {
        self.meta.get_or_insert_with(TokenMeta::default)
    }

    pub fn is_inline_container(&self) -> bool {
        self.kind == "inline"
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
