mod highlight;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use highlight::SyntectHighlighter;

const BASE_CSS: &str = include_str!("../assets/marktree.css");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(Theme::Auto),
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme `{other}` (expected auto, light or dark)")),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Auto => "auto",
            Theme::Light => "light",
            Theme::Dark => "dark",
        })
    }
}

/// Page-level presentation for compiled HTML: theme variables, the base
/// stylesheet and a standalone document wrapper.
#[derive(Debug, Clone)]
pub struct Renderer {
    theme: Theme,
    custom_vars: BTreeMap<String, String>,
}

impl Renderer {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            custom_vars: BTreeMap::new(),
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Overrides one CSS custom property, e.g. `--marktree-accent`.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_vars.insert(key.into(), value.into());
        self
    }

    /// A highlighter whose colors match this renderer's theme.
    pub fn highlighter(&self) -> SyntectHighlighter {
        SyntectHighlighter::new(self.theme)
    }

    pub fn stylesheet(&self) -> String {
        let mut out = String::new();
        let (light_vars, dark_vars) = default_theme_vars();

        match self.theme {
            Theme::Auto => {
                out.push_str(&root_block(&light_vars, "", true));
                out.push_str("@media (prefers-color-scheme: dark) {\n");
                out.push_str(&root_block(&dark_vars, "  ", true));
                out.push_str("}\n");
            }
            Theme::Light => out.push_str(&root_block(&light_vars, "", true)),
            Theme::Dark => out.push_str(&root_block(&dark_vars, "", true)),
        }

        if !self.custom_vars.is_empty() {
            out.push_str(&root_block(&self.custom_vars, "", false));
        }

        out.push_str(BASE_CSS);
        out
    }

    /// Wraps a compiled fragment in a standalone HTML document.
    pub fn embed_html(&self, html: &str, with_inline_css: bool) -> String {
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n");
        out.push_str("<html lang=\"en\">\n");
        out.push_str("<head>\n");
        out.push_str("  <meta charset=\"utf-8\" />\n");
        out.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
        if with_inline_css {
            out.push_str("  <style>\n");
            out.push_str(&self.stylesheet());
            out.push_str("\n  </style>\n");
        } else {
            out.push_str("  <link rel=\"stylesheet\" href=\"marktree.css\" />\n");
        }
        out.push_str("</head>\n");
        out.push_str("<body>\n");
        out.push_str("<main class=\"marktree\">\n");
        out.push_str(html);
        if !html.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("</main>\n");
        out.push_str("</body>\n");
        out.push_str("</html>\n");
        out
    }

    /// Writes `marktree.css` into `out_dir`, creating it if needed.
    pub fn generate_files(&self, out_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(out_dir)?;
        fs::write(out_dir.join("marktree.css"), self.stylesheet())?;
        tracing::debug!(dir = %out_dir.display(), theme = %self.theme, "wrote stylesheet");
        Ok(())
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Theme::Auto)
    }
}

fn default_theme_vars() -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let light = [
        ("--marktree-bg", "#fbfbf8"),
        ("--marktree-fg", "#1f2328"),
        ("--marktree-muted", "#5f6b76"),
        ("--marktree-border", "#d8dee4"),
        ("--marktree-accent", "#2b6cb0"),
        ("--marktree-code-bg", "#f4f6f8"),
        ("--marktree-code-fg", "#1f2328"),
        ("--marktree-placeholder", "#eef1f4"),
    ];
    let dark = [
        ("--marktree-bg", "#0e1116"),
        ("--marktree-fg", "#e6edf3"),
        ("--marktree-muted", "#9aa4af"),
        ("--marktree-border", "#2a313b"),
        ("--marktree-accent", "#63b3ed"),
        ("--marktree-code-bg", "#202634"),
        ("--marktree-code-fg", "#f0f6fc"),
        ("--marktree-placeholder", "#1b212b"),
    ];
    let collect = |vars: &[(&str, &str)]| {
        vars.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>()
    };
    (collect(&light), collect(&dark))
}

fn root_block(vars: &BTreeMap<String, String>, indent: &str, color_scheme: bool) -> String {
    let mut out = String::new();
    out.push_str(indent);
    out.push_str(":root {\n");
    if color_scheme {
        out.push_str(indent);
        out.push_str("  color-scheme: light dark;\n");
    }
    for (key, value) in vars {
        out.push_str(indent);
        out.push_str("  ");
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push_str(";\n");
    }
    out.push_str(indent);
    out.push_str("}\n");
    out
}
