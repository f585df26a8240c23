//! Default collaborators used when none are supplied

mod dot;
mod fact_dump;
mod line_codec;
mod pattern_rules;

pub use dot::DotRenderer;
pub use fact_dump::FactDumpRenderer;
pub use line_codec::LineCodec;
pub use pattern_rules::PatternRuleEngine;
