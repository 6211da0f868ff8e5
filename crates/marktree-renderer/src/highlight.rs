use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use marktree_core::{Highlighter, escape_text};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme as SyntectTheme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::Theme;

const CACHE_CAPACITY: usize = 128;

/// Inline-styled syntax highlighting backed by syntect's bundled grammars.
///
/// Output is a run of `<span style=...>` elements meant to sit inside the
/// default `pre > code` wrapper; unknown languages yield `None` so the
/// caller escapes the code itself.
pub struct SyntectHighlighter {
    syntax_set: SyntaxSet,
    theme: SyntectTheme,
    cache: Mutex<LruCache<(String, String), Option<String>>>,
}

impl SyntectHighlighter {
    pub fn new(theme: Theme) -> Self {
        let theme_set = ThemeSet::load_defaults();
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme: pick_theme(theme, &theme_set),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn find_syntax(&self, lang: &str) -> Option<&SyntaxReference> {
        if lang.is_empty() {
            return None;
        }
        self.syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_token(&lang.to_ascii_lowercase()))
    }

    fn highlight_uncached(&self, code: &str, syntax: &SyntaxReference) -> String {
        let mut out = String::with_capacity(code.len() * 2);
        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        for line in LinesWithEndings::from(code) {
            let rendered = highlighter
                .highlight_line(line, &self.syntax_set)
                .ok()
                .and_then(|ranges| styled_line_to_highlighted_html(&ranges, IncludeBackground::No).ok());
            match rendered {
                Some(html) => out.push_str(&strip_font_weight(&html)),
                None => out.push_str(&escape_text(line)),
            }
        }
        out
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new(Theme::Auto)
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, lang: &str, _attrs: &str) -> Option<String> {
        let syntax = self.find_syntax(lang)?;
        let key = (syntax.name.clone(), code.to_string());
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        tracing::trace!(lang, syntax = %syntax.name, "highlighting code block");
        let html = Some(self.highlight_uncached(code, syntax));

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, html.clone());
        }
        html
    }
}

fn pick_theme(theme: Theme, theme_set: &ThemeSet) -> SyntectTheme {
    let candidates = match theme {
        Theme::Dark => ["Monokai Extended Bright", "Monokai Extended", "base16-ocean.dark"],
        Theme::Light | Theme::Auto => ["InspiredGitHub", "Solarized (light)", "base16-ocean.light"],
    };
    candidates
        .iter()
        .find_map(|name| theme_set.themes.get(*name))
        .or_else(|| theme_set.themes.values().next())
        .cloned()
        .unwrap_or_default()
}

/// Bold runs shift monospace alignment; the page stylesheet owns weight.
fn strip_font_weight(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find("font-weight:") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + "font-weight:".len()..];
        match tail.find(';') {
            Some(end) => rest = &tail[end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use marktree_core::Highlighter;

    use super::{SyntectHighlighter, strip_font_weight};
    use crate::Theme;

    #[test]
    fn known_language_gets_inline_styles() {
        let highlighter = SyntectHighlighter::new(Theme::Light);
        let html = highlighter.highlight("let x = 1 < 2;\n", "rust", "");
        let html = html.unwrap_or_default();
        assert!(html.contains("<span style=\""));
        assert!(html.contains("&lt;"));
        assert!(!html.contains("font-weight"));
        assert!(!html.starts_with("<pre"));
    }

    #[test]
    fn unknown_language_is_left_to_the_caller() {
        let highlighter = SyntectHighlighter::default();
        assert_eq!(highlighter.highlight("x", "no-such-lang", ""), None);
        assert_eq!(highlighter.highlight("x", "", ""), None);
    }

    #[test]
    fn repeated_blocks_hit_the_cache() {
        let highlighter = SyntectHighlighter::new(Theme::Dark);
        let first = highlighter.highlight("print(1)\n", "python", "");
        let second = highlighter.highlight("print(1)\n", "python", "");
        assert!(first.is_some());
        assert_eq!(first, second);
        let cached = highlighter.cache.lock().map(|cache| cache.len()).unwrap_or(0);
        assert_eq!(cached, 1);
    }

    #[test]
    fn font_weight_is_removed() {
        assert_eq!(
            strip_font_weight("<span style=\"color:#000;font-weight:bold;\">x</span>"),
            "<span style=\"color:#000;\">x</span>"
        );
    }
}
