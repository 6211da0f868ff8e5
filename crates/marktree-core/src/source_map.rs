#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

/// Line index over a source text, used to turn byte ranges into token maps.
#[derive(Clone, Debug)]
pub struct SourceMap {
    source_len: usize,
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = Vec::new();
        line_starts.push(0);
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            source_len: source.len(),
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// End offset of every line, excluding its newline.
    pub fn line_ends(&self) -> Vec<usize> {
        // Every line but the last is terminated by the `\n` at `next - 1`.
        self.line_starts
            .iter()
            .enumerate()
            .map(|(line, start)| match self.line_starts.get(line + 1) {
                Some(next) => next - 1,
                None => self.source_len.max(*start),
            })
            .collect()
    }

    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset.min(self.source_len);
        match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source_len);
        let line = self.line_of(offset);
        let line_start = self.line_starts[line];
        Position {
            line,
            // Byte offset from line start (ASCII-safe for now).
            character: offset.saturating_sub(line_start),
        }
    }

    /// Token map for a byte range: 0-based start line, exclusive end line.
    pub fn line_span(&self, start: usize, end: usize) -> (usize, usize) {
        let first = self.line_of(start);
        if end <= start {
            return (first, first + 1);
        }
        // A range ending right after a newline does not cover the next line.
        let last = self.line_of(end - 1);
        (first, last.max(first) + 1)
    }
}
