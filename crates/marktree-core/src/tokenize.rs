//! Markdown to token stream, via `pulldown-cmark`.
//!
//! Hosts usually bring their own tokenizer; this adapter produces the same
//! flat, markdown-it shaped stream so the CLI and tests have a source of
//! tokens. Block tokens carry `map` line spans; inline content is grouped
//! under one `inline` token per paragraph, heading or table cell.

use std::ops::Range;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::Deserialize;

use crate::source_map::SourceMap;
use crate::token::{Nesting, Token};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct TokenizeOptions {
    pub tables: bool,
    pub strikethrough: bool,
    pub tasklists: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            tasklists: true,
        }
    }
}

pub fn tokenize(source: &str, options: &TokenizeOptions) -> Vec<Token> {
    let mut flags = Options::empty();
    if options.tables {
        flags.insert(Options::ENABLE_TABLES);
    }
    if options.strikethrough {
        flags.insert(Options::ENABLE_STRIKETHROUGH);
    }
    if options.tasklists {
        flags.insert(Options::ENABLE_TASKLISTS);
    }

    let mut stream = TokenStream::new(source);
    for (event, range) in Parser::new_ext(source, flags).into_offset_iter() {
        stream.event(event, range);
    }
    stream.finish()
}

/// Inline tokens collected for the block currently open.
struct InlineGroup {
    children: Vec<Token>,
    range: Option<Range<usize>>,
    level: i32,
    /// Opened for a tight list item, which has no paragraph event.
    implicit: bool,
}

struct TokenStream<'s> {
    source: &'s str,
    map: SourceMap,
    tokens: Vec<Token>,
    level: i32,
    inline: Option<InlineGroup>,
    images: Vec<Token>,
    literal: Option<Token>,
    alignments: Vec<Alignment>,
    cell: usize,
    in_head: bool,
    body_open: bool,
}

impl<'s> TokenStream<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            map: SourceMap::new(source),
            tokens: Vec::new(),
            level: 0,
            inline: None,
            images: Vec::new(),
            literal: None,
            alignments: Vec::new(),
            cell: 0,
            in_head: false,
            body_open: false,
        }
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(literal) = self.literal.as_mut() {
                    literal.content.push_str(&text);
                } else {
                    self.inline_token(
                        Token::new("text", "", Nesting::SelfClosing).with_content(text.to_string()),
                        range,
                    );
                }
            }
            Event::Code(code) => self.inline_token(
                Token::new("code_inline", "code", Nesting::SelfClosing)
                    .with_content(code.to_string())
                    .with_markup("`"),
                range,
            ),
            Event::Html(html) => {
                if let Some(literal) = self.literal.as_mut() {
                    literal.content.push_str(&html);
                }
            }
            Event::InlineHtml(html) => self.inline_token(
                Token::new("html_inline", "", Nesting::SelfClosing).with_content(html.to_string()),
                range,
            ),
            Event::SoftBreak => {
                self.inline_token(Token::new("softbreak", "br", Nesting::SelfClosing), range)
            }
            Event::HardBreak => {
                self.inline_token(Token::new("hardbreak", "br", Nesting::SelfClosing), range)
            }
            Event::TaskListMarker(checked) => {
                let input = if checked {
                    r#"<input class="task-list-item-checkbox" type="checkbox" disabled checked>"#
                } else {
                    r#"<input class="task-list-item-checkbox" type="checkbox" disabled>"#
                };
                self.inline_token(
                    Token::new("html_inline", "", Nesting::SelfClosing).with_content(input),
                    range,
                );
            }
            Event::Rule => {
                self.close_implicit();
                let map = self.map.line_span(range.start, range.end);
                self.block(Token::new("hr", "hr", Nesting::SelfClosing).with_markup("---"), Some(map));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        let map = Some(self.map.line_span(range.start, range.end));
        match tag {
            Tag::Paragraph => {
                self.close_implicit();
                self.block(Token::new("paragraph_open", "p", Nesting::Opening), map);
                self.open_inline(false);
            }
            Tag::Heading {
                level, id, classes, ..
            } => {
                self.close_implicit();
                let tag = heading_tag(level);
                let mut token = Token::new("heading_open", tag, Nesting::Opening)
                    .with_markup("#".repeat(level as usize));
                if let Some(id) = id {
                    token.attr_set("id", id.to_string());
                }
                for class in classes {
                    token.attr_join("class", &class);
                }
                self.block(token, map);
                self.open_inline(false);
            }
            Tag::BlockQuote(_) => {
                self.close_implicit();
                self.block(
                    Token::new("blockquote_open", "blockquote", Nesting::Opening).with_markup(">"),
                    map,
                );
            }
            Tag::CodeBlock(kind) => {
                self.close_implicit();
                let mut token = match kind {
                    CodeBlockKind::Fenced(info) => Token::new("fence", "code", Nesting::SelfClosing)
                        .with_info(info.to_string())
                        .with_markup("```"),
                    CodeBlockKind::Indented => Token::new("code_block", "code", Nesting::SelfClosing),
                };
                token.map = map;
                self.literal = Some(token);
            }
            Tag::HtmlBlock => {
                self.close_implicit();
                let mut token = Token::new("html_block", "", Nesting::SelfClosing);
                token.map = map;
                self.literal = Some(token);
            }
            Tag::List(start) => {
                self.close_implicit();
                let token = match start {
                    Some(start) => {
                        let mut token = Token::new("ordered_list_open", "ol", Nesting::Opening);
                        if start != 1 {
                            token.attr_set("start", start.to_string());
                        }
                        token
                    }
                    None => Token::new("bullet_list_open", "ul", Nesting::Opening),
                };
                self.block(token, map);
            }
            Tag::Item => {
                self.close_implicit();
                self.block(Token::new("list_item_open", "li", Nesting::Opening), map);
            }
            Tag::Table(alignments) => {
                self.alignments = alignments;
                self.body_open = false;
                self.block(Token::new("table_open", "table", Nesting::Opening), map);
            }
            Tag::TableHead => {
                self.in_head = true;
                self.cell = 0;
                self.block(Token::new("thead_open", "thead", Nesting::Opening), map);
                self.block(Token::new("tr_open", "tr", Nesting::Opening), map);
            }
            Tag::TableRow => {
                if !self.body_open {
                    self.body_open = true;
                    self.block(Token::new("tbody_open", "tbody", Nesting::Opening), map);
                }
                self.cell = 0;
                self.block(Token::new("tr_open", "tr", Nesting::Opening), map);
            }
            Tag::TableCell => {
                let (kind, tag) = if self.in_head {
                    ("th_open", "th")
                } else {
                    ("td_open", "td")
                };
                let mut token = Token::new(kind, tag, Nesting::Opening);
                if let Some(align) = alignment_style(self.alignments.get(self.cell)) {
                    token.attr_set("style", align);
                }
                self.block(token, map);
                self.open_inline(false);
            }
            Tag::Emphasis => self.inline_token(
                Token::new("em_open", "em", Nesting::Opening).with_markup("*"),
                range,
            ),
            Tag::Strong => self.inline_token(
                Token::new("strong_open", "strong", Nesting::Opening).with_markup("**"),
                range,
            ),
            Tag::Strikethrough => self.inline_token(
                Token::new("s_open", "s", Nesting::Opening).with_markup("~~"),
                range,
            ),
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut token = Token::new("link_open", "a", Nesting::Opening)
                    .with_attr("href", dest_url.to_string());
                if !title.is_empty() {
                    token.attr_set("title", title.to_string());
                }
                self.inline_token(token, range);
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                let mut token = Token::new("image", "img", Nesting::SelfClosing)
                    .with_attr("src", dest_url.to_string())
                    .with_attr("alt", "")
                    .with_children(Vec::new());
                if !title.is_empty() {
                    token.attr_set("title", title.to_string());
                }
                self.ensure_inline(&range);
                self.images.push(token);
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.close_inline();
                self.block(Token::new("paragraph_close", "p", Nesting::Closing), None);
            }
            TagEnd::Heading(level) => {
                self.close_inline();
                self.block(Token::new("heading_close", heading_tag(level), Nesting::Closing), None);
            }
            TagEnd::BlockQuote(_) => {
                self.close_implicit();
                self.block(Token::new("blockquote_close", "blockquote", Nesting::Closing), None);
            }
            TagEnd::CodeBlock | TagEnd::HtmlBlock => {
                if let Some(mut literal) = self.literal.take() {
                    literal.level = self.level;
                    self.tokens.push(literal.block());
                }
            }
            TagEnd::List(ordered) => {
                self.close_implicit();
                let token = if ordered {
                    Token::new("ordered_list_close", "ol", Nesting::Closing)
                } else {
                    Token::new("bullet_list_close", "ul", Nesting::Closing)
                };
                self.block(token, None);
            }
            TagEnd::Item => {
                self.close_implicit();
                self.block(Token::new("list_item_close", "li", Nesting::Closing), None);
            }
            TagEnd::Table => {
                if self.body_open {
                    self.block(Token::new("tbody_close", "tbody", Nesting::Closing), None);
                }
                self.block(Token::new("table_close", "table", Nesting::Closing), None);
            }
            TagEnd::TableHead => {
                self.block(Token::new("tr_close", "tr", Nesting::Closing), None);
                self.block(Token::new("thead_close", "thead", Nesting::Closing), None);
                self.in_head = false;
            }
            TagEnd::TableRow => {
                self.block(Token::new("tr_close", "tr", Nesting::Closing), None);
            }
            TagEnd::TableCell => {
                self.close_inline();
                let (kind, tag) = if self.in_head {
                    ("th_close", "th")
                } else {
                    ("td_close", "td")
                };
                self.block(Token::new(kind, tag, Nesting::Closing), None);
                self.cell += 1;
            }
            TagEnd::Emphasis => self.inline_close("em_close", "em", "*"),
            TagEnd::Strong => self.inline_close("strong_close", "strong", "**"),
            TagEnd::Strikethrough => self.inline_close("s_close", "s", "~~"),
            TagEnd::Link => self.inline_close("link_close", "a", ""),
            TagEnd::Image => {
                if let Some(image) = self.images.pop() {
                    self.push_inline(image);
                }
            }
            _ => {}
        }
    }

    fn block(&mut self, mut token: Token, map: Option<(usize, usize)>) {
        if token.nesting == Nesting::Closing {
            self.level -= 1;
        }
        token.level = self.level;
        token.map = map;
        if token.nesting == Nesting::Opening {
            self.level += 1;
        }
        self.tokens.push(token.block());
    }

    fn open_inline(&mut self, implicit: bool) {
        self.inline = Some(InlineGroup {
            children: Vec::new(),
            range: None,
            level: 0,
            implicit,
        });
    }

    /// Tight list items carry inline content without a paragraph; wrap it in
    /// a hidden one the way markdown-it does.
    fn ensure_inline(&mut self, range: &Range<usize>) {
        if self.inline.is_some() {
            return;
        }
        let map = self.map.line_span(range.start, range.end);
        self.block(
            Token::new("paragraph_open", "p", Nesting::Opening).hidden(),
            Some(map),
        );
        self.open_inline(true);
    }

    fn inline_token(&mut self, token: Token, range: Range<usize>) {
        self.ensure_inline(&range);
        if let Some(group) = self.inline.as_mut() {
            group.range = Some(match group.range.take() {
                Some(seen) => seen.start.min(range.start)..seen.end.max(range.end),
                None => range,
            });
        }
        self.push_inline(token);
    }

    fn inline_close(&mut self, kind: &str, tag: &str, markup: &str) {
        self.push_inline(Token::new(kind, tag, Nesting::Closing).with_markup(markup));
    }

    fn push_inline(&mut self, mut token: Token) {
        if let Some(image) = self.images.last_mut() {
            image.children.get_or_insert_with(Vec::new).push(token);
            return;
        }
        let Some(group) = self.inline.as_mut() else {
            return;
        };
        if token.nesting == Nesting::Closing {
            group.level -= 1;
        }
        token.level = group.level;
        if token.nesting == Nesting::Opening {
            group.level += 1;
        }
        if token.kind == "text" {
            if let Some(last) = group.children.last_mut() {
                if last.kind == "text" {
                    last.content.push_str(&token.content);
                    return;
                }
            }
        }
        group.children.push(token);
    }

    fn close_inline(&mut self) {
        let Some(group) = self.inline.take() else {
            return;
        };
        let (content, map) = match &group.range {
            Some(range) => (
                self.source[range.clone()].trim().to_string(),
                Some(self.map.line_span(range.start, range.end)),
            ),
            None => (String::new(), None),
        };
        let mut token = Token::new("inline", "", Nesting::SelfClosing)
            .with_content(content)
            .with_children(group.children);
        token.level = self.level;
        token.map = map;
        self.tokens.push(token.block());
    }

    fn close_implicit(&mut self) {
        if self.inline.as_ref().is_some_and(|group| group.implicit) {
            self.close_inline();
            self.block(
                Token::new("paragraph_close", "p", Nesting::Closing).hidden(),
                None,
            );
        }
    }

    fn finish(mut self) -> Vec<Token> {
        self.close_implicit();
        self.close_inline();
        self.tokens
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn alignment_style(alignment: Option<&Alignment>) -> Option<&'static str> {
    match alignment? {
        Alignment::None => None,
        Alignment::Left => Some("text-align:left"),
        Alignment::Center => Some("text-align:center"),
        Alignment::Right => Some("text-align:right"),
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenizeOptions, tokenize};
    use crate::token::Nesting;

    fn kinds(source: &str) -> Vec<String> {
        tokenize(source, &TokenizeOptions::default())
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn heading_and_paragraph() {
        let tokens = tokenize("# Title\n\nSome *text*", &TokenizeOptions::default());
        let kinds: Vec<&str> = tokens.iter().map(|token| token.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "heading_open",
                "inline",
                "heading_close",
                "paragraph_open",
                "inline",
                "paragraph_close",
            ]
        );
        assert_eq!(tokens[0].tag, "h1");
        assert_eq!(tokens[0].map, Some((0, 1)));
        assert_eq!(tokens[3].map, Some((2, 3)));
        assert_eq!(tokens[0].nesting, Nesting::Opening);
        assert_eq!(tokens[1].level, 1);

        let inline = tokens[4].children.as_deref().unwrap_or_default();
        let inline_kinds: Vec<&str> = inline.iter().map(|token| token.kind.as_str()).collect();
        assert_eq!(inline_kinds, vec!["text", "em_open", "text", "em_close"]);
        assert_eq!(inline[2].content, "text");
    }

    #[test]
    fn tight_list_items_get_hidden_paragraphs() {
        let tokens = tokenize("- a\n- b\n", &TokenizeOptions::default());
        let paragraphs: Vec<_> = tokens
            .iter()
            .filter(|token| token.kind.starts_with("paragraph"))
            .collect();
        assert_eq!(paragraphs.len(), 4);
        assert!(paragraphs.iter().all(|token| token.hidden));
    }

    #[test]
    fn loose_list_paragraphs_are_visible() {
        let tokens = tokenize("- a\n\n- b\n", &TokenizeOptions::default());
        assert!(
            tokens
                .iter()
                .filter(|token| token.kind == "paragraph_open")
                .all(|token| !token.hidden)
        );
    }

    #[test]
    fn fence_keeps_info_and_content() {
        let tokens = tokenize("```js title\nlet a;\n```\n", &TokenizeOptions::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, "fence");
        assert_eq!(tokens[0].info, "js title");
        assert_eq!(tokens[0].content, "let a;\n");
        assert_eq!(tokens[0].map, Some((0, 3)));
        assert!(tokens[0].block);
    }

    #[test]
    fn indented_code_and_rule() {
        assert_eq!(kinds("    code\n\n---\n"), vec!["code_block", "hr"]);
    }

    #[test]
    fn image_children_hold_alt_text() {
        let tokens = tokenize("![an *alt*](x.png \"t\")", &TokenizeOptions::default());
        let inline = tokens[1].children.as_deref().unwrap_or_default();
        let image = &inline[0];
        assert_eq!(image.kind, "image");
        assert_eq!(image.attr_get("src"), Some("x.png"));
        assert_eq!(image.attr_get("title"), Some("t"));
        assert_eq!(image.children.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn tables_get_head_and_body() {
        let kinds = kinds("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        assert_eq!(
            kinds,
            vec![
                "table_open",
                "thead_open",
                "tr_open",
                "th_open",
                "inline",
                "th_close",
                "th_open",
                "inline",
                "th_close",
                "tr_close",
                "thead_close",
                "tbody_open",
                "tr_open",
                "td_open",
                "inline",
                "td_close",
                "td_open",
                "inline",
                "td_close",
                "tr_close",
                "tbody_close",
                "table_close",
            ]
        );
        let tokens = tokenize("| a |\n|--:|\n| 1 |\n", &TokenizeOptions::default());
        assert_eq!(tokens[3].attr_get("style"), Some("text-align:right"));
    }

    #[test]
    fn html_block_is_one_token() {
        let tokens = tokenize("<div>\nhi\n</div>\n", &TokenizeOptions::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, "html_block");
        assert_eq!(tokens[0].content, "<div>\nhi\n</div>\n");
    }

    #[test]
    fn task_markers_become_checkboxes() {
        let tokens = tokenize("- [x] done\n", &TokenizeOptions::default());
        let inline = tokens
            .iter()
            .find(|token| token.kind == "inline")
            .and_then(|token| token.children.clone())
            .unwrap_or_default();
        assert_eq!(inline[0].kind, "html_inline");
        assert!(inline[0].content.contains("checked"));
    }

    #[test]
    fn disabled_extensions_stay_text() {
        let options = TokenizeOptions {
            tables: false,
            strikethrough: false,
            tasklists: false,
        };
        let tokens = tokenize("~~x~~", &options);
        let inline = tokens[1].children.as_deref().unwrap_or_default();
        assert!(inline.iter().all(|token| token.kind == "text"));
    }
}
