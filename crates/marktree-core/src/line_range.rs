use crate::env::{MacroLine, RenderEnv};
use crate::token::Token;

/// Source line span of `token`, corrected for macro expansion.
///
/// Both bounds stay 0-based with an exclusive end, like `token.map`. Tokens
/// without a map resolve to `(0, 1)`.
pub fn resolve_line_range(token: &Token, env: &RenderEnv) -> (usize, usize) {
    let (start, end) = token.map.unwrap_or((0, 1));
    let (Some(table), Some(b_marks), Some(e_marks)) =
        (env.macro_lines.as_deref(), env.b_marks.as_deref(), env.e_marks.as_deref())
    else {
        return (start, end);
    };
    if table.is_empty() {
        return (start, end);
    }

    let start_offset = b_marks
        .get(start)
        .map(|pos| line_offset_at(*pos, table))
        .unwrap_or(0);
    let end_offset = end
        .checked_sub(1)
        .and_then(|last| e_marks.get(last))
        .map(|pos| line_offset_at(*pos, table))
        .unwrap_or(0);

    (shift(start, start_offset), shift(end, end_offset))
}

/// Offset of the last table entry that precedes `pos` in both the previous
/// and the current adjusted coordinate space.
fn line_offset_at(pos: usize, table: &[MacroLine]) -> isize {
    let pos = pos as isize;
    let mut offset = 0;
    for entry in table {
        let match_pos = entry.match_pos as isize;
        if pos + entry.pos_offset > match_pos && pos + entry.current_pos_offset > match_pos {
            offset = entry.line_offset;
        } else {
            break;
        }
    }
    offset
}

fn shift(line: usize, offset: isize) -> usize {
    line.saturating_add_signed(offset)
}

#[cfg(test)]
mod tests {
    use super::resolve_line_range;
    use crate::env::{MacroLine, RenderEnv};
    use crate::token::{Nesting, Token};

    fn marks(lines: usize, width: usize) -> (Vec<usize>, Vec<usize>) {
        let starts = (0..lines).map(|line| line * (width + 1)).collect::<Vec<_>>();
        let ends = starts.iter().map(|start| start + width).collect();
        (starts, ends)
    }

    fn paragraph(start: usize, end: usize) -> Token {
        Token::new("paragraph_open", "p", Nesting::Opening).with_map(start, end)
    }

    #[test]
    fn map_is_returned_verbatim_without_table() {
        let token = paragraph(5, 6);
        assert_eq!(resolve_line_range(&token, &RenderEnv::new()), (5, 6));
    }

    #[test]
    fn missing_map_defaults_to_first_line() {
        let token = Token::new("hr", "hr", Nesting::SelfClosing);
        assert_eq!(resolve_line_range(&token, &RenderEnv::new()), (0, 1));
    }

    #[test]
    fn offset_applies_after_macro() {
        let (b_marks, e_marks) = marks(10, 9);
        let env = RenderEnv {
            macro_lines: Some(vec![MacroLine {
                match_pos: 20,
                line_offset: 2,
                pos_offset: 0,
                current_pos_offset: 12,
            }]),
            b_marks: Some(b_marks),
            e_marks: Some(e_marks),
            ..RenderEnv::default()
        };
        assert_eq!(resolve_line_range(&paragraph(5, 6), &env), (7, 8));
        // Line 1 starts at byte 10, before the macro.
        assert_eq!(resolve_line_range(&paragraph(1, 2), &env), (1, 2));
    }

    #[test]
    fn later_entries_stop_at_first_non_matching() {
        let (b_marks, e_marks) = marks(20, 9);
        let env = RenderEnv {
            macro_lines: Some(vec![
                MacroLine {
                    match_pos: 5,
                    line_offset: 1,
                    pos_offset: 0,
                    current_pos_offset: 4,
                },
                MacroLine {
                    match_pos: 150,
                    line_offset: 3,
                    pos_offset: 4,
                    current_pos_offset: 9,
                },
            ]),
            b_marks: Some(b_marks),
            e_marks: Some(e_marks),
            ..RenderEnv::default()
        };
        assert_eq!(resolve_line_range(&paragraph(3, 4), &env), (4, 5));
        assert_eq!(resolve_line_range(&paragraph(16, 17), &env), (19, 20));
    }

    #[test]
    fn negative_offsets_saturate() {
        let (b_marks, e_marks) = marks(4, 3);
        let env = RenderEnv {
            macro_lines: Some(vec![MacroLine {
                match_pos: 0,
                line_offset: -5,
                pos_offset: 0,
                current_pos_offset: 0,
            }]),
            b_marks: Some(b_marks),
            e_marks: Some(e_marks),
            ..RenderEnv::default()
        };
        assert_eq!(resolve_line_range(&paragraph(1, 2), &env), (0, 0));
    }
}
