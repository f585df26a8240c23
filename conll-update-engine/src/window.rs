//! Lookback/lookahead context windows over the block stream

use crate::block::SentenceBlock;
use std::collections::VecDeque;

/// The unit of work handed to a worker
///
/// `current` is the only block the worker may rewrite; the surrounding
/// blocks are read-only context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceContext {
    /// Preceding blocks, oldest first
    pub lookback: Vec<SentenceBlock>,
    /// The block to transform
    pub current: SentenceBlock,
    /// Following blocks, nearest first
    pub lookahead: Vec<SentenceBlock>,
}

impl SentenceContext {
    /// A context without surrounding sentences
    pub fn isolated(current: SentenceBlock) -> Self {
        Self {
            lookback: Vec::new(),
            current,
            lookahead: Vec::new(),
        }
    }
}

/// Holds back each block until `lookahead` further blocks have arrived and
/// remembers the last `lookback` dispatched blocks
///
/// For the block at position `p` the emitted context holds blocks
/// `[p - lookback, p - 1]` and `[p + 1, p + lookahead]`, clipped at the
/// stream boundaries.
#[derive(Debug)]
pub struct WindowBuffer {
    lookback: usize,
    lookahead: usize,
    pending: VecDeque<SentenceBlock>,
    history: VecDeque<SentenceBlock>,
}

impl WindowBuffer {
    /// Create a window with the given context sizes
    pub fn new(lookback: usize, lookahead: usize) -> Self {
        Self {
            lookback,
            lookahead,
            pending: VecDeque::with_capacity(lookahead + 1),
            history: VecDeque::with_capacity(lookback),
        }
    }

    /// Add a newly segmented block; returns the context that became eligible
    pub fn push(&mut self, block: SentenceBlock) -> Option<SentenceContext> {
        self.pending.push_back(block);
        if self.pending.len() > self.lookahead {
            self.dispatch_next()
        } else {
            None
        }
    }

    /// End-of-stream flush: returns the next held-back context, if any
    pub fn drain(&mut self) -> Option<SentenceContext> {
        self.dispatch_next()
    }

    /// Blocks waiting for enough lookahead
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn dispatch_next(&mut self) -> Option<SentenceContext> {
        let current = self.pending.pop_front()?;
        let context = SentenceContext {
            lookback: self.history.iter().cloned().collect(),
            current: current.clone(),
            lookahead: self.pending.iter().cloned().collect(),
        };

        if self.lookback > 0 {
            if self.history.len() == self.lookback {
                self.history.pop_front();
            }
            self.history.push_back(current);
        }

        Some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(n: usize) -> Vec<SentenceBlock> {
        (0..n).map(|i| SentenceBlock::from(format!("s{i}\n"))).collect()
    }

    fn names(blocks: &[SentenceBlock]) -> Vec<String> {
        blocks.iter().map(|b| b.text().trim().to_string()).collect()
    }

    fn run(lookback: usize, lookahead: usize, n: usize) -> Vec<SentenceContext> {
        let mut window = WindowBuffer::new(lookback, lookahead);
        let mut contexts: Vec<_> = blocks(n).into_iter().filter_map(|b| window.push(b)).collect();
        while let Some(context) = window.drain() {
            contexts.push(context);
        }
        contexts
    }

    #[test]
    fn test_zero_lookahead_dispatches_immediately() {
        let mut window = WindowBuffer::new(0, 0);
        let context = window.push(SentenceBlock::from("s0\n")).unwrap();
        assert_eq!(context, SentenceContext::isolated(SentenceBlock::from("s0\n")));
        assert_eq!(window.pending_len(), 0);
    }

    #[test]
    fn test_lookahead_holds_back_until_enough_blocks() {
        let mut window = WindowBuffer::new(0, 1);
        let mut input = blocks(2).into_iter();
        assert!(window.push(input.next().unwrap()).is_none());
        let first = window.push(input.next().unwrap()).unwrap();
        assert_eq!(first.current.text(), "s0\n");
        assert_eq!(names(&first.lookahead), vec!["s1"]);

        let second = window.drain().unwrap();
        assert_eq!(second.current.text(), "s1\n");
        assert!(second.lookahead.is_empty());
        assert!(window.drain().is_none());
    }

    #[test]
    fn test_windows_cover_neighbours_and_clip_at_edges() {
        let contexts = run(2, 2, 5);
        assert_eq!(contexts.len(), 5);
        for (p, context) in contexts.iter().enumerate() {
            assert_eq!(context.current.text().trim(), format!("s{p}"));
            let expected_back: Vec<String> = (p.saturating_sub(2)..p).map(|i| format!("s{i}")).collect();
            let expected_ahead: Vec<String> = (p + 1..(p + 3).min(5)).map(|i| format!("s{i}")).collect();
            assert_eq!(names(&context.lookback), expected_back);
            assert_eq!(names(&context.lookahead), expected_ahead);
        }
    }

    #[test]
    fn test_lookback_without_lookahead() {
        let contexts = run(1, 0, 3);
        assert!(contexts[0].lookback.is_empty());
        assert_eq!(names(&contexts[2].lookback), vec!["s1"]);
        assert!(contexts.iter().all(|c| c.lookahead.is_empty()));
    }
}
