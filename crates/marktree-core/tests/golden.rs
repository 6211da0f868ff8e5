use std::fs;
use std::path::{Path, PathBuf};

use marktree_core::{Compiler, RenderEnv, TokenizeOptions, compile_markdown, to_html};

#[test]
fn golden_fixtures() -> Result<(), Box<dyn std::error::Error>> {
    run_fixtures("", RenderEnv::new())
}

#[test]
fn golden_safe_fixtures() -> Result<(), Box<dyn std::error::Error>> {
    run_fixtures("safe", RenderEnv::safe())
}

fn run_fixtures(subdir: &str, env: RenderEnv) -> Result<(), Box<dyn std::error::Error>> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let fixtures_dir = root.join("tests/fixtures").join(subdir);
    let expect_dir = root.join("tests/expect").join(subdir);

    let mut fixtures = collect_fixtures(&fixtures_dir)?;
    fixtures.sort_by(|a, b| file_name(a).cmp(file_name(b)));
    if fixtures.is_empty() {
        return Err(format!("no fixtures in {}", fixtures_dir.display()).into());
    }

    let compiler = Compiler::default();
    for fixture in fixtures {
        let name = file_stem(&fixture)?;
        let source = fs::read_to_string(&fixture)?;
        let nodes = compile_markdown(&compiler, &source, &TokenizeOptions::default(), env.clone());
        let html = to_html(&nodes);

        let html_path = expect_dir.join(format!("{}.html", name));
        let expected = fs::read_to_string(&html_path)?;
        assert_eq!(
            html.trim_end(),
            expected.trim_end(),
            "HTML mismatch for fixture {}",
            name
        );
    }

    Ok(())
}

fn collect_fixtures(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut fixtures = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("md") {
            fixtures.push(path);
        }
    }
    Ok(fixtures)
}

fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
}

fn file_stem(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|value| value.to_string())
        .ok_or_else(|| "fixture name is not valid UTF-8".into())
}
