//! Splitting a line stream into self-contained sentence blocks

use crate::block::{is_directive, is_namespace_declaration, normalize_line, SentenceBlock};
use crate::error::{EngineError, Result};
use std::io::BufRead;

/// Accumulates lines and cuts a block whenever a directive line follows a
/// non-directive line
///
/// Blocks without their own namespace declarations inherit the most recently
/// seen declaration set, so every emitted block parses on its own.
#[derive(Debug, Default)]
pub struct StreamSegmenter {
    buffer: String,
    last_line: String,
    prefix_cache: String,
}

impl StreamSegmenter {
    /// Create an empty segmenter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw input line; returns the block it closes, if any
    pub fn push_line(&mut self, raw: &str) -> Option<SentenceBlock> {
        let line = normalize_line(raw);

        let boundary = !self.buffer.trim().is_empty()
            && is_directive(&line)
            && !is_directive(&self.last_line);
        let emitted = boundary.then(|| self.take_block());

        self.buffer.push_str(&line);
        self.buffer.push('\n');
        self.last_line = line;

        emitted
    }

    /// Flush the remaining buffer at end of stream
    pub fn finish(&mut self) -> Option<SentenceBlock> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }
        Some(self.take_block())
    }

    fn take_block(&mut self) -> SentenceBlock {
        let mut buffer = std::mem::take(&mut self.buffer);

        let declarations: String = buffer
            .lines()
            .filter(|line| is_namespace_declaration(line))
            .flat_map(|line| [line, "\n"])
            .collect();

        if declarations.is_empty() {
            buffer.insert_str(0, &self.prefix_cache);
        } else {
            self.prefix_cache = declarations;
        }

        SentenceBlock::from(buffer)
    }
}

/// Iterator over the sentence blocks of a reader
///
/// Input must be UTF-8; an undecodable line ends the iteration with
/// [`EngineError::Encoding`].
pub struct Segments<R> {
    reader: R,
    segmenter: StreamSegmenter,
    line_buffer: Vec<u8>,
    line_number: usize,
    done: bool,
}

impl<R: BufRead> Segments<R> {
    /// Segment the given reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            segmenter: StreamSegmenter::new(),
            line_buffer: Vec::new(),
            line_number: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for Segments<R> {
    type Item = Result<SentenceBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line_buffer.clear();
            match self.reader.read_until(b'\n', &mut self.line_buffer) {
                Ok(0) => {
                    self.done = true;
                    return self.segmenter.finish().map(Ok);
                }
                Ok(_) => {
                    self.line_number += 1;
                    let line = match std::str::from_utf8(&self.line_buffer) {
                        Ok(line) => line,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(EngineError::Encoding(format!(
                                "input line {} is not valid UTF-8: {e}",
                                self.line_number
                            ))));
                        }
                    };
                    if let Some(block) = self.segmenter.push_line(line) {
                        return Some(Ok(block));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn segment(input: &str) -> Vec<String> {
        Segments::new(Cursor::new(input.as_bytes()))
            .map(|block| block.unwrap().text().to_string())
            .collect()
    }

    #[test]
    fn test_directive_after_content_starts_new_block() {
        let blocks = segment("# s1\n:a :b :c .\n# s2\n:d :e :f .\n");
        assert_eq!(blocks, vec!["# s1\n:a :b :c .\n", "# s2\n:d :e :f .\n"]);
    }

    #[test]
    fn test_consecutive_directives_stay_together() {
        let blocks = segment("@prefix : <http://x#> .\n# s1\n:a :b :c .\n# s2\n# more\n:d :e :f .\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], "@prefix : <http://x#> .\n# s2\n# more\n:d :e :f .\n");
    }

    #[test]
    fn test_cached_prefixes_are_prepended() {
        let input = "@prefix : <http://x#> .\n:a :b :c .\n# s2\n:d :e :f .\n@prefix y: <http://y#> .\n:g :h :i .\n# s4\n:j :k :l .\n";
        let blocks = segment(input);
        assert_eq!(blocks.len(), 4);
        assert!(blocks[1].starts_with("@prefix : <http://x#> .\n# s2"));
        assert_eq!(blocks[2], "@prefix y: <http://y#> .\n:g :h :i .\n");
        assert!(blocks[3].starts_with("@prefix y: <http://y#> .\n# s4"));
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let blocks = segment("#  s1\n:a\t\t:b   :c .  \n");
        assert_eq!(blocks, vec!["# s1\n:a :b :c .\n"]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(segment("").is_empty());
        assert!(segment("\n\n  \n").is_empty());
    }

    #[test]
    fn test_boundary_is_detected_one_line_late() {
        let mut segmenter = StreamSegmenter::new();
        assert!(segmenter.push_line("# s1").is_none());
        assert!(segmenter.push_line(":a :b :c .").is_none());
        let first = segmenter.push_line("# s2").unwrap();
        assert_eq!(first.text(), "# s1\n:a :b :c .\n");
        assert_eq!(segmenter.finish().unwrap().text(), "# s2\n");
        assert!(segmenter.finish().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_an_encoding_error() {
        let input: &[u8] = b"# s1\n:a :b \xff\xfe .\n";
        let results: Vec<_> = Segments::new(Cursor::new(input)).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(EngineError::Encoding(_))));
    }
}
