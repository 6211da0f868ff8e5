mod config;

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use marktree_core::{
    CompileOptions, Compiler, RenderEnv, RenderNode, TokenizeOptions, to_html, to_html_sanitized,
    tokenize, tokens_from_json,
};
use marktree_renderer::{Renderer, Theme};
use tracing_subscriber::EnvFilter;

use crate::config::{CliError, FileConfig};

#[derive(Parser)]
#[command(name = "marktree", version, about = "Compile Markdown into a render tree")]
struct Cli {
    /// Markdown file, or token JSON with --tokens; stdin when omitted
    input: Option<PathBuf>,

    /// Treat the input as a markdown-it token JSON array
    #[arg(long)]
    tokens: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Neutralize unsafe URLs and raw markup
    #[arg(long)]
    safe: bool,

    /// Run the HTML through an allow-list sanitizer
    #[arg(long)]
    sanitized: bool,

    /// Render soft line breaks as <br>
    #[arg(long)]
    breaks: bool,

    /// Class prefix for fenced code languages
    #[arg(long, value_name = "PREFIX")]
    lang_prefix: Option<String>,

    /// Syntax-highlight fenced code
    #[arg(long)]
    highlight: bool,

    /// Color theme for highlighting and --format page: auto, light or dark
    #[arg(long)]
    theme: Option<Theme>,

    /// TOML file with default settings; flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Html,
    Json,
    Page,
}

/// File settings with command-line flags applied on top.
#[derive(Debug)]
struct Settings {
    breaks: bool,
    lang_prefix: Option<String>,
    safe_mode: bool,
    sanitized: bool,
    highlight: bool,
    theme: Theme,
    tokenize: TokenizeOptions,
}

impl Settings {
    fn resolve(cli: &Cli, file: FileConfig) -> Self {
        Self {
            breaks: cli.breaks || file.breaks,
            lang_prefix: cli.lang_prefix.clone().or(file.lang_prefix),
            safe_mode: cli.safe || file.safe_mode,
            sanitized: cli.sanitized || file.sanitized,
            highlight: cli.highlight || file.highlight,
            theme: cli.theme.or(file.theme).unwrap_or_default(),
            tokenize: file.tokenize,
        }
    }

    fn compiler(&self, renderer: &Renderer) -> Compiler {
        let mut options = CompileOptions::default().with_breaks(self.breaks);
        if let Some(prefix) = &self.lang_prefix {
            options = options.with_lang_prefix(prefix.as_str());
        }
        if self.highlight {
            options = options.with_highlight(renderer.highlighter());
        }
        Compiler::new(options)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("marktree: {err}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MARKTREE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(cli, file);
    tracing::debug!(?settings, "resolved settings");

    let source = read_input(cli.input.as_ref())?;
    let renderer = Renderer::new(settings.theme);
    let compiler = settings.compiler(&renderer);
    let nodes = compile(&compiler, &source, cli.tokens, &settings)?;

    let output = match cli.format {
        Format::Json => serde_json::to_string_pretty(&nodes)?,
        Format::Html => html(&nodes, settings.sanitized),
        Format::Page => renderer.embed_html(&html(&nodes, settings.sanitized), true),
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes()).map_err(CliError::Write)?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n").map_err(CliError::Write)?;
    }
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<String, CliError> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.clone(),
            source,
        }),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(CliError::Stdin)?;
            Ok(buffer)
        }
    }
}

fn compile(
    compiler: &Compiler,
    source: &str,
    tokens: bool,
    settings: &Settings,
) -> Result<Vec<RenderNode>, CliError> {
    let env = RenderEnv::new().with_safe_mode(settings.safe_mode);
    if tokens {
        let mut stream = tokens_from_json(source)?;
        return Ok(compiler.compile(&mut stream, &env));
    }
    let mut stream = tokenize(source, &settings.tokenize);
    let env = env.with_line_marks(source);
    Ok(compiler.compile(&mut stream, &env))
}

fn html(nodes: &[RenderNode], sanitized: bool) -> String {
    if sanitized {
        to_html_sanitized(nodes)
    } else {
        to_html(nodes)
    }
}
