use std::panic::{self, AssertUnwindSafe};

use marktree_core::{
    Compiler, RenderEnv, RenderNode, TokenizeOptions, compile_markdown, escape_text,
    is_safe_attribute_value, is_valid_attribute_name, to_html, unescape_entities,
};
use proptest::prelude::*;

const CASES: usize = 200;
const MAX_LEN: usize = 512;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 \
\n\t#@*`~$[](){}!<>:+-_=./|\\\\\"'&;";

#[test]
fn compile_never_panics_on_random_input() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x3c6e_f372_fe94_f82b);
    let compiler = Compiler::default();
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        let safe = rng.gen_range(0, 2) == 1;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let env = RenderEnv::new().with_safe_mode(safe);
            let nodes = compile_markdown(&compiler, &source, &TokenizeOptions::default(), env);
            to_html(&nodes)
        }));
        if result.is_err() {
            return Err(format!("compile panicked for case {}: {:?}", case, source).into());
        }
    }
    Ok(())
}

#[test]
fn top_level_token_indices_increase() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0xa54f_f53a_5f1d_36f1);
    let compiler = Compiler::default();
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        let nodes = compile_markdown(&compiler, &source, &TokenizeOptions::default(), RenderEnv::new());
        let mut previous: Option<usize> = None;
        for node in &nodes {
            let Some(idx) = node.attr("data-token-idx") else {
                continue;
            };
            let idx: usize = idx.parse()?;
            if previous.is_some_and(|previous| previous >= idx) {
                return Err(format!(
                    "token index {} out of order for case {}\nSource:\n---\n{}\n---",
                    idx, case, source
                )
                .into());
            }
            previous = Some(idx);
        }
    }
    Ok(())
}

#[test]
fn safe_mode_output_has_no_script_urls() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x510e_527f_ade6_82d1);
    let compiler = Compiler::default();
    let pieces = [
        "[a](javascript:alert(1))",
        "![i](JavaScript:x)",
        "<a href=\"vbscript:y\">v</a>",
        "<img src=\"data:image/png;base64,AA\">",
        "text ",
        "\n\n",
        "*em* ",
    ];
    for case in 0..CASES {
        let count = rng.gen_range(1, 8);
        let source: String = (0..count)
            .map(|_| pieces[rng.gen_range(0, pieces.len())])
            .collect();
        let nodes = compile_markdown(&compiler, &source, &TokenizeOptions::default(), RenderEnv::safe());
        if let Err(message) = check_urls(&nodes) {
            return Err(format!("case {}: {}\nSource:\n---\n{}\n---", case, message, source).into());
        }
    }
    Ok(())
}

fn check_urls(nodes: &[RenderNode]) -> Result<(), String> {
    for node in nodes {
        if let Some(element) = node.as_element() {
            for (name, value) in element.attrs.iter() {
                if !is_valid_attribute_name(name) {
                    return Err(format!("invalid attribute `{}` on <{}>", name, element.tag));
                }
                if !is_safe_attribute_value(name, value) {
                    return Err(format!("unsafe `{}={}` on <{}>", name, value, element.tag));
                }
            }
        }
        check_urls(node.children())?;
    }
    Ok(())
}

proptest! {
    #[test]
    fn escaped_text_has_no_markup_characters(text in ".*") {
        let escaped = escape_text(&text);
        prop_assert!(!escaped.contains(['<', '>', '"', '\'']));
    }

    #[test]
    fn unescape_inverts_escape(text in ".*") {
        let escaped = escape_text(&text);
        prop_assert_eq!(unescape_entities(&escaped).into_owned(), text);
    }

    #[test]
    fn second_escape_only_touches_ampersands(text in "[&<>\"']*") {
        let once = escape_text(&text).into_owned();
        let twice = escape_text(&once).into_owned();
        prop_assert_eq!(&twice, &once.replace('&', "&amp;"));
        prop_assert_eq!(unescape_entities(&twice).into_owned(), once.clone());
        prop_assert_eq!(unescape_entities(&once).into_owned(), text);
    }

    #[test]
    fn event_handler_names_are_never_valid(suffix in "[a-zA-Z0-9_-]{0,12}", upper in any::<bool>()) {
        let prefix = if upper { "ON" } else { "on" };
        let name = format!("{}{}", prefix, suffix);
        prop_assert!(!is_valid_attribute_name(&name));
    }

    #[test]
    fn plain_text_paragraph_survives(words in proptest::collection::vec("[a-z]{1,8}", 1..10)) {
        let source = words.join(" ");
        let nodes = compile_markdown(
            &Compiler::default(),
            &source,
            &TokenizeOptions::default(),
            RenderEnv::new(),
        );
        prop_assert_eq!(nodes.len(), 1);
        prop_assert_eq!(nodes[0].tag(), Some("p"));
        prop_assert_eq!(nodes[0].text_content(), source);
    }
}

fn random_string(rng: &mut Lcg, len: usize) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let idx = rng.gen_range(0, CHARSET.len());
        out.push(CHARSET[idx] as char);
    }
    out
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn gen_range(&mut self, min: usize, max: usize) -> usize {
        if max <= min {
            return min;
        }
        let span = max - min;
        let value = (self.next() >> 1) as usize;
        min + (value % span)
    }
}
