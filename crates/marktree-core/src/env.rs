use serde::{Deserialize, Serialize};

use crate::source_map::SourceMap;

/// Ambient state for one compile pass. Never retained by the compiler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderEnv {
    /// Neutralize unsafe attribute values and raw markup before rendering.
    pub safe_mode: bool,
    /// Offsets recorded by an upstream macro-expansion step, in source order.
    pub macro_lines: Option<Vec<MacroLine>>,
    /// Byte offset of the first character of each line.
    pub b_marks: Option<Vec<usize>>,
    /// Byte offset just past the last character of each line.
    pub e_marks: Option<Vec<usize>>,
}

/// One entry of the macro-expansion offset table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MacroLine {
    /// Byte position of the macro in the expanded text.
    pub match_pos: usize,
    /// Line shift that applies to everything after this macro.
    pub line_offset: isize,
    /// Byte shift accumulated before this macro.
    pub pos_offset: isize,
    /// Byte shift including this macro.
    pub current_pos_offset: isize,
}

impl RenderEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn safe() -> Self {
        Self {
            safe_mode: true,
            ..Self::default()
        }
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    pub fn with_macro_lines(mut self, macro_lines: Vec<MacroLine>) -> Self {
        self.macro_lines = Some(macro_lines);
        self
    }

    /// Fills `b_marks`/`e_marks` from the text that was tokenized.
    pub fn with_line_marks(mut self, source: &str) -> Self {
        let map = SourceMap::new(source);
        self.b_marks = Some(map.line_starts().to_vec());
        self.e_marks = Some(map.line_ends());
        self
    }
}
