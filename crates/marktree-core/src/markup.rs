use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use html_escape::decode_html_entities;
use lru::LruCache;

use crate::node::{Attributes, Element, RenderNode};
use crate::security::{
    is_dangerous_element, is_safe_attribute_value, is_valid_attribute_name,
    sanitize_markup_fragment,
};

/// How much a raw fragment is trusted when it is turned into nodes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum MarkupPolicy {
    /// Highlighter output; converted as-is.
    Trusted,
    /// Raw document markup; invalid attribute names are dropped.
    #[default]
    Standard,
    /// Untrusted documents; dangerous elements and unsafe URLs are removed too.
    Safe,
}

const CACHE_CAPACITY: usize = 256;
/// Fragments longer than this are parsed every time instead of cached.
const MAX_CACHED_LEN: usize = 4096;

type CacheKey = (String, MarkupPolicy);

/// Memoized [`parse_markup`] owned by one compiler.
pub struct MarkupCache {
    entries: Mutex<LruCache<CacheKey, Vec<RenderNode>>>,
}

impl MarkupCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn parse(&self, raw: &str, policy: MarkupPolicy) -> Vec<RenderNode> {
        if raw.len() > MAX_CACHED_LEN {
            return parse_markup(raw, policy);
        }
        let key = (raw.to_string(), policy);
        if let Some(cached) = self.lock().get(&key) {
            return cached.clone();
        }
        let nodes = parse_markup(raw, policy);
        self.lock().put(key, nodes.clone());
        nodes
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Vec<RenderNode>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MarkupCache {
    fn default() -> Self {
        Self::new(CACHE_CAPACITY)
    }
}

impl fmt::Debug for MarkupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkupCache").field("len", &self.len()).finish()
    }
}

/// Parses an HTML fragment into render nodes.
///
/// Unparseable input yields an empty list, which callers render as nothing.
pub fn parse_markup(raw: &str, policy: MarkupPolicy) -> Vec<RenderNode> {
    if raw.is_empty() {
        return Vec::new();
    }
    parse_uncached(raw, policy)
}

fn parse_uncached(raw: &str, policy: MarkupPolicy) -> Vec<RenderNode> {
    let dom = match tl::parse(raw, tl::ParserOptions::default()) {
        Ok(dom) => dom,
        Err(err) => {
            tracing::warn!(error = ?err, "discarding unparseable markup");
            return Vec::new();
        }
    };
    let parser = dom.parser();
    let mut out = Vec::new();
    for handle in dom.children() {
        convert(*handle, parser, policy, &mut out);
    }
    out
}

fn convert(
    handle: tl::NodeHandle,
    parser: &tl::Parser<'_>,
    policy: MarkupPolicy,
    out: &mut Vec<RenderNode>,
) {
    let Some(node) = handle.get(parser) else {
        return;
    };
    match node {
        tl::Node::Raw(bytes) => {
            let text = bytes.as_utf8_str();
            if !text.is_empty() {
                out.push(RenderNode::Text(decode_html_entities(&text).into_owned()));
            }
        }
        tl::Node::Comment(bytes) => {
            let text = bytes.as_utf8_str();
            let body = text
                .strip_prefix("<!--")
                .and_then(|rest| rest.strip_suffix("-->"))
                .unwrap_or(&text);
            out.push(RenderNode::Comment(body.to_string()));
        }
        tl::Node::Tag(tag) => {
            let name = tag.name().as_utf8_str();
            if policy == MarkupPolicy::Safe {
                if is_dangerous_element(&name) {
                    tracing::debug!(element = %name, "dropping dangerous element");
                    return;
                }
                if name.eq_ignore_ascii_case("svg") {
                    let clean = sanitize_markup_fragment(&tag.raw().as_utf8_str());
                    out.extend(parse_uncached(&clean, MarkupPolicy::Trusted));
                    return;
                }
            }

            let mut attrs = Attributes::new();
            for (key, value) in tag.attributes().iter() {
                let value = value.map(|value| decode_html_entities(&value).into_owned());
                let value = value.unwrap_or_default();
                if policy != MarkupPolicy::Trusted && !is_valid_attribute_name(&key) {
                    continue;
                }
                if policy == MarkupPolicy::Safe && !is_safe_attribute_value(&key, &value) {
                    attrs.set(key.into_owned(), "");
                    continue;
                }
                attrs.set(key.into_owned(), value);
            }

            let mut children = Vec::new();
            for child in tag.children().top().iter() {
                convert(*child, parser, policy, &mut children);
            }
            out.push(
                Element::new(name.into_owned())
                    .with_attrs(attrs)
                    .with_children(children)
                    .into(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MarkupCache, MarkupPolicy, parse_markup};
    use crate::node::RenderNode;

    #[test]
    fn nested_markup_becomes_elements() {
        let nodes = parse_markup(
            r#"<div class="note"><b>bold</b> &amp; plain</div>"#,
            MarkupPolicy::Standard,
        );
        assert_eq!(nodes.len(), 1);
        let div = &nodes[0];
        assert_eq!(div.tag(), Some("div"));
        assert_eq!(div.attr("class"), Some("note"));
        assert_eq!(div.children()[0].tag(), Some("b"));
        assert_eq!(div.text_content(), "bold & plain");
    }

    #[test]
    fn event_handlers_are_dropped_unless_trusted() {
        let raw = r#"<span onclick="x()" title="t">s</span>"#;
        let standard = parse_markup(raw, MarkupPolicy::Standard);
        assert_eq!(standard[0].attr("onclick"), None);
        assert_eq!(standard[0].attr("title"), Some("t"));

        let trusted = parse_markup(raw, MarkupPolicy::Trusted);
        assert_eq!(trusted[0].attr("onclick"), Some("x()"));
    }

    #[test]
    fn safe_policy_removes_scripts_and_blanks_urls() {
        let raw = r#"<p><script>alert(1)</script><a href="javascript:alert(1)">x</a></p>"#;
        let nodes = parse_markup(raw, MarkupPolicy::Safe);
        let p = &nodes[0];
        assert_eq!(p.children().len(), 1);
        assert_eq!(p.children()[0].tag(), Some("a"));
        assert_eq!(p.children()[0].attr("href"), Some(""));

        let standard = parse_markup(raw, MarkupPolicy::Standard);
        assert_eq!(standard[0].children()[0].tag(), Some("script"));
    }

    #[test]
    fn safe_policy_sanitizes_inline_svg() {
        let raw = r#"<svg xmlns="http://www.w3.org/2000/svg"><script>x</script><circle r="1"/></svg>"#;
        let nodes = parse_markup(raw, MarkupPolicy::Safe);
        assert_eq!(nodes.len(), 1);
        let svg = &nodes[0];
        assert_eq!(svg.tag(), Some("svg"));
        assert!(svg.children().iter().all(|child| child.tag() != Some("script")));
    }

    #[test]
    fn comments_keep_their_body() {
        let nodes = parse_markup("<!-- note -->", MarkupPolicy::Standard);
        assert_eq!(nodes, vec![RenderNode::Comment(" note ".to_string())]);
    }

    #[test]
    fn named_and_numeric_entities_are_decoded() {
        let nodes = parse_markup(
            "<p title=\"&copy;&#8212;\">&copy; 2024&nbsp;x &#x263A; &lt;b&gt;</p>",
            MarkupPolicy::Standard,
        );
        assert_eq!(nodes[0].attr("title"), Some("\u{a9}\u{2014}"));
        assert_eq!(nodes[0].text_content(), "\u{a9} 2024\u{a0}x \u{263a} <b>");
    }

    #[test]
    fn cache_is_bounded_and_keyed_by_policy() {
        let cache = MarkupCache::new(2);
        let raw = "<b onclick=\"x()\">b</b>";
        let trusted = cache.parse(raw, MarkupPolicy::Trusted);
        let standard = cache.parse(raw, MarkupPolicy::Standard);
        assert_eq!(trusted[0].attr("onclick"), Some("x()"));
        assert_eq!(standard[0].attr("onclick"), None);
        assert_eq!(cache.parse(raw, MarkupPolicy::Standard), standard);
        assert_eq!(cache.len(), 2);

        cache.parse("<i>i</i>", MarkupPolicy::Safe);
        assert_eq!(cache.len(), 2);

        let long = format!("<p>{}</p>", "x".repeat(5000));
        assert_eq!(cache.parse(&long, MarkupPolicy::Safe)[0].text_content().len(), 5000);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse_markup("", MarkupPolicy::Safe).is_empty());
    }
}
