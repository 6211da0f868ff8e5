//! Attribute and markup safety checks.
//!
//! The policy is narrow on purpose: attribute names are validated, a fixed
//! set of URL-bearing attributes is checked for script-capable schemes, and
//! a fixed set of elements is removed from raw fragments. It is not a
//! general HTML sanitizer; `html::to_html_sanitized` covers that case.

use std::borrow::Cow;

/// Attributes whose values are treated as URLs.
pub const SENSITIVE_ATTRIBUTES: &[&str] = &["href", "src", "xlink:href", "poster", "srcset"];

/// Elements removed, with their subtree, from raw markup fragments.
pub const DANGEROUS_ELEMENTS: &[&str] = &[
    "script",
    "iframe",
    "object",
    "embed",
    "link",
    "style",
    "foreignObject",
];

const UNSAFE_SCHEMES: &[&str] = &["javascript:", "vbscript:", "file:", "data:"];

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const FRAGMENT_ROOT: &str = "marktree-fragment";

/// `[A-Za-z_:][A-Za-z0-9:._-]*`, minus anything starting with `on`.
pub fn is_valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == ':') {
        return false;
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, ':' | '.' | '_' | '-')) {
        return false;
    }
    !(name.len() >= 2 && name[..2].eq_ignore_ascii_case("on"))
}

pub fn is_sensitive_attribute(name: &str) -> bool {
    SENSITIVE_ATTRIBUTES
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}

pub fn is_dangerous_element(tag: &str) -> bool {
    DANGEROUS_ELEMENTS
        .iter()
        .any(|dangerous| dangerous.eq_ignore_ascii_case(tag))
}

/// Only sensitive attributes are inspected; every other value is accepted.
pub fn is_safe_attribute_value(name: &str, value: &str) -> bool {
    if !is_sensitive_attribute(name) {
        return true;
    }
    if name.eq_ignore_ascii_case("srcset") {
        return value
            .split(',')
            .all(|candidate| is_safe_url(candidate.split_whitespace().next().unwrap_or("")));
    }
    is_safe_url(value)
}

fn is_safe_url(value: &str) -> bool {
    // Browsers drop embedded tabs and newlines before resolving the scheme.
    let normalized: String = value
        .trim()
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace() && !ch.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    !UNSAFE_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

/// Replaces `& < > " '` with entities; borrows when there is nothing to do.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Inverse of [`escape_text`] for exactly its five entities.
pub fn unescape_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ]
        .iter()
        .find(|(entity, _)| tail.starts_with(entity));
        match decoded {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Parses a well-formed HTML/SVG fragment, drops dangerous elements, event
/// handlers and unsafe URLs, and serializes the remainder.
///
/// Returns an empty string when the fragment is not well-formed; callers
/// render nothing in that case.
pub fn sanitize_markup_fragment(raw: &str) -> String {
    let body = strip_xml_prolog(raw.trim());
    if body.is_empty() {
        return String::new();
    }
    let wrapped = format!(
        "<{root} xmlns:xlink=\"{XLINK_NS}\">{body}</{root}>",
        root = FRAGMENT_ROOT
    );
    let document = match roxmltree::Document::parse(&wrapped) {
        Ok(document) => document,
        Err(err) => {
            tracing::warn!(error = %err, "discarding malformed markup fragment");
            return String::new();
        }
    };
    let mut out = String::with_capacity(raw.len());
    for child in document.root_element().children() {
        write_xml_node(&mut out, child, true);
    }
    out
}

fn strip_xml_prolog(raw: &str) -> &str {
    if raw.starts_with("<?xml") {
        if let Some(end) = raw.find("?>") {
            return raw[end + 2..].trim_start();
        }
    }
    raw
}

fn write_xml_node(out: &mut String, node: roxmltree::Node<'_, '_>, top_level: bool) {
    if node.is_text() {
        if let Some(text) = node.text() {
            out.push_str(&escape_text(text));
        }
        return;
    }
    if !node.is_element() {
        return;
    }
    let name = node.tag_name().name();
    if is_dangerous_element(name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    if top_level {
        if let Some(uri) = node.tag_name().namespace() {
            push_xml_attr(out, "xmlns", uri);
        }
        if node.descendants().any(uses_xlink) {
            push_xml_attr(out, "xmlns:xlink", XLINK_NS);
        }
    }
    for attr in node.attributes() {
        let qualified = match attr.namespace() {
            Some(XLINK_NS) => format!("xlink:{}", attr.name()),
            Some(XML_NS) => format!("xml:{}", attr.name()),
            _ => attr.name().to_string(),
        };
        if !is_valid_attribute_name(&qualified) {
            continue;
        }
        if !is_safe_attribute_value(&qualified, attr.value()) {
            continue;
        }
        push_xml_attr(out, &qualified, attr.value());
    }

    if !node.has_children() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in node.children() {
        write_xml_node(out, child, false);
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn uses_xlink(node: roxmltree::Node<'_, '_>) -> bool {
    node.attributes()
        .any(|attr| attr.namespace() == Some(XLINK_NS))
}

fn push_xml_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_text(value));
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_names_follow_the_pattern() {
        assert!(is_valid_attribute_name("data-x"));
        assert!(is_valid_attribute_name("aria-label"));
        assert!(is_valid_attribute_name("_v"));
        assert!(is_valid_attribute_name("xlink:href"));
        assert!(!is_valid_attribute_name("1bad"));
        assert!(!is_valid_attribute_name("a@b"));
        assert!(!is_valid_attribute_name(""));
    }

    #[test]
    fn event_handler_names_are_rejected() {
        assert!(!is_valid_attribute_name("onclick"));
        assert!(!is_valid_attribute_name("ONLOAD"));
        assert!(!is_valid_attribute_name("On"));
        assert!(is_valid_attribute_name("o"));
        assert!(!is_valid_attribute_name("one-x"));
    }

    #[test]
    fn sensitive_urls_are_checked() {
        assert!(!is_safe_attribute_value("href", "javascript:alert(1)"));
        assert!(!is_safe_attribute_value("href", "  JavaScript:alert(1)"));
        assert!(!is_safe_attribute_value("src", "data:text/html,x"));
        assert!(!is_safe_attribute_value("poster", "file:///etc/passwd"));
        assert!(!is_safe_attribute_value("xlink:href", "vbscript:msgbox"));
        assert!(!is_safe_attribute_value("href", "java\tscript:alert(1)"));
        assert!(is_safe_attribute_value("href", "https://x"));
        assert!(is_safe_attribute_value("href", "/relative/javascript:"));
    }

    #[test]
    fn non_sensitive_attributes_skip_value_checks() {
        assert!(is_safe_attribute_value("class", "javascript:whatever"));
        assert!(is_safe_attribute_value("title", "data:"));
    }

    #[test]
    fn srcset_checks_every_candidate() {
        assert!(is_safe_attribute_value("srcset", "a.png 1x, b.png 2x"));
        assert!(!is_safe_attribute_value(
            "srcset",
            "a.png 1x, javascript:alert(1) 2x"
        ));
    }

    #[test]
    fn escape_borrows_when_clean() {
        assert!(matches!(escape_text("plain text"), Cow::Borrowed(_)));
        assert_eq!(
            escape_text(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn unescape_leaves_unknown_entities() {
        assert_eq!(unescape_entities("&copy; &amp;lt; &#39;"), "&copy; &lt; '");
        assert_eq!(unescape_entities("a & b"), "a & b");
    }

    #[test]
    fn sanitize_strips_scripts_and_handlers() {
        let raw = r#"<svg xmlns="http://www.w3.org/2000/svg" onload="x()"><script>alert(1)</script><rect width="1" onclick="y()"/></svg>"#;
        let clean = sanitize_markup_fragment(raw);
        assert_eq!(
            clean,
            r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="1"/></svg>"#
        );
    }

    #[test]
    fn sanitize_drops_foreign_object_and_unsafe_links() {
        let raw = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink"><a xlink:href="javascript:alert(1)"><text>t</text></a><use xlink:href="#icon"/><foreignObject><div/></foreignObject></svg>"##;
        let clean = sanitize_markup_fragment(raw);
        assert!(!clean.contains("foreignObject"));
        assert!(!clean.contains("javascript"));
        assert!(clean.contains(r##"<use xlink:href="#icon"/>"##));
        assert!(clean.contains(r#"xmlns:xlink="http://www.w3.org/1999/xlink""#));
    }

    #[test]
    fn sanitize_rejects_malformed_markup() {
        assert_eq!(sanitize_markup_fragment("<svg><g></svg>"), "");
        assert_eq!(sanitize_markup_fragment(""), "");
    }

    #[test]
    fn sanitize_accepts_prolog_and_sibling_roots() {
        let raw = "<?xml version=\"1.0\"?>\n<b>x</b><i>y</i>";
        assert_eq!(sanitize_markup_fragment(raw), "<b>x</b><i>y</i>");
    }
}
