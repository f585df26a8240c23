//! Property-based checks of output ordering

use conll_update_engine::{RuleSpec, Updater};
use proptest::prelude::*;
use std::io::Cursor;

fn corpus(lengths: &[usize]) -> String {
    let mut text = String::new();
    for (i, words) in lengths.iter().enumerate() {
        text.push_str(&format!("# sent {i}\n:s{i}_0 a nif:Sentence .\n"));
        for w in 1..=*words {
            text.push_str(&format!(":s{i}_{w} :WORD \"w\" .\n"));
        }
    }
    text
}

fn sentence_order(output: &str) -> Vec<usize> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("# sent "))
        .map(|n| n.parse().unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Output order equals input order for any window size and pool size
    #[test]
    fn output_order_matches_input(
        lengths in prop::collection::vec(0usize..6, 0..25),
        lookahead in 0usize..4,
        lookback in 0usize..4,
        threads in 1usize..5,
    ) {
        let rule: RuleSpec = r"INSERT :ctx :of :$1 . WHERE LOOKAHEAD /^:(s\d+_0) a/".parse().unwrap();
        let updater = Updater::builder()
            .threads(Some(threads))
            .lookahead(lookahead)
            .lookback(lookback)
            .update(rule)
            .build()
            .unwrap();

        let mut out = Vec::new();
        let summary = updater
            .run(Cursor::new(corpus(&lengths).into_bytes()), &mut out)
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        prop_assert_eq!(summary.sentences as usize, lengths.len());
        prop_assert_eq!(sentence_order(&out), (0..lengths.len()).collect::<Vec<_>>());
    }
}
