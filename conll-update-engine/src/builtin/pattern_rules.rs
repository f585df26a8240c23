//! A small regex-driven rewrite language
//!
//! Each non-empty, non-comment line of a rule is one operation:
//!
//! ```text
//! DELETE /pattern/
//! REPLACE /pattern/ => template
//! INSERT template
//! INSERT template WHERE [LOOKBACK | LOOKAHEAD | GRAPH <name>] /pattern/
//! ```
//!
//! Patterns match whole statements of the current sentence unless a `WHERE`
//! clause names another region. Templates may refer to capture groups as
//! `$1` or `${name}`. A `/` inside a pattern is written `\/`.

use crate::collaborator::RuleEngine;
use crate::error::RuleError;
use crate::graph::{Graph, Workspace};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Region {
    Current,
    Lookback,
    Lookahead,
    Graph(String),
}

#[derive(Debug)]
enum Operation {
    Delete(Regex),
    Replace {
        pattern: Regex,
        template: String,
    },
    Insert {
        template: String,
        source: Option<(Region, Regex)>,
    },
}

/// Rule engine for the pattern language
#[derive(Debug, Default)]
pub struct PatternRuleEngine {
    compiled: Mutex<HashMap<String, Arc<Operation>>>,
}

impl PatternRuleEngine {
    /// Create an engine with an empty operation cache
    pub fn new() -> Self {
        Self::default()
    }

    fn operation(&self, text: &str) -> Result<Arc<Operation>, RuleError> {
        if let Some(operation) = self.compiled.lock().get(text) {
            return Ok(Arc::clone(operation));
        }
        let operation = Arc::new(parse_operation(text)?);
        self.compiled
            .lock()
            .insert(text.to_string(), Arc::clone(&operation));
        Ok(operation)
    }
}

impl RuleEngine for PatternRuleEngine {
    fn prepare(&self, text: &str) -> Result<Vec<String>, RuleError> {
        let operations: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        if operations.is_empty() {
            return Err(RuleError::Empty);
        }
        for operation in &operations {
            self.operation(operation)?;
        }
        Ok(operations)
    }

    fn apply(&self, workspace: &mut Workspace, operation: &str) -> Result<bool, RuleError> {
        match self.operation(operation)?.as_ref() {
            Operation::Delete(pattern) => {
                Ok(workspace.current_mut().retain(|s| !pattern.is_match(s)) > 0)
            }
            Operation::Replace { pattern, template } => {
                let current = workspace.current_mut();
                let rewrites: Vec<(String, String)> = current
                    .statements()
                    .filter(|s| pattern.is_match(s))
                    .map(|s| (s.to_string(), pattern.replace_all(s, template.as_str()).into_owned()))
                    .filter(|(old, new)| old != new)
                    .collect();
                for (old, _) in &rewrites {
                    current.remove(old);
                }
                let changed = !rewrites.is_empty();
                for (_, new) in rewrites {
                    current.insert(new);
                }
                Ok(changed)
            }
            Operation::Insert { template, source: None } => {
                Ok(workspace.current_mut().insert(template.clone()))
            }
            Operation::Insert {
                template,
                source: Some((region, pattern)),
            } => {
                let graph = region_graph(workspace, region)?;
                let mut inserts = Vec::new();
                for statement in graph.statements() {
                    for captures in pattern.captures_iter(statement) {
                        let mut expanded = String::new();
                        captures.expand(template, &mut expanded);
                        inserts.push(expanded);
                    }
                }

                let current = workspace.current_mut();
                let mut changed = false;
                for statement in inserts {
                    changed |= current.insert(statement);
                }
                Ok(changed)
            }
        }
    }
}

fn region_graph<'a>(workspace: &'a Workspace, region: &Region) -> Result<&'a Graph, RuleError> {
    match region {
        Region::Current => Ok(workspace.current()),
        Region::Lookback => Ok(workspace.lookback()),
        Region::Lookahead => Ok(workspace.lookahead()),
        Region::Graph(name) => workspace
            .base()
            .graph(name)
            .ok_or_else(|| RuleError::Execution(format!("unknown graph <{name}>"))),
    }
}

fn parse_operation(text: &str) -> Result<Operation, RuleError> {
    let syntax = |reason: &str| RuleError::Syntax {
        operation: text.to_string(),
        reason: reason.to_string(),
    };

    let (keyword, rest) = text
        .split_once(char::is_whitespace)
        .ok_or_else(|| syntax("expected a keyword followed by arguments"))?;
    let rest = rest.trim();

    if keyword.eq_ignore_ascii_case("DELETE") {
        let (pattern, tail) = parse_pattern(rest).map_err(|r| syntax(&r))?;
        if !tail.is_empty() {
            return Err(syntax("unexpected text after pattern"));
        }
        Ok(Operation::Delete(pattern))
    } else if keyword.eq_ignore_ascii_case("REPLACE") {
        let (pattern, tail) = parse_pattern(rest).map_err(|r| syntax(&r))?;
        let template = tail
            .strip_prefix("=>")
            .ok_or_else(|| syntax("expected '=>' after pattern"))?
            .trim();
        Ok(Operation::Replace {
            pattern,
            template: template.to_string(),
        })
    } else if keyword.eq_ignore_ascii_case("INSERT") {
        let Some((template, clause)) = split_where(rest) else {
            return Ok(Operation::Insert {
                template: rest.to_string(),
                source: None,
            });
        };
        if template.is_empty() {
            return Err(syntax("empty template"));
        }
        let (region, pattern_text) = parse_region(clause).map_err(|r| syntax(&r))?;
        let (pattern, tail) = parse_pattern(pattern_text).map_err(|r| syntax(&r))?;
        if !tail.is_empty() {
            return Err(syntax("unexpected text after pattern"));
        }
        Ok(Operation::Insert {
            template: template.to_string(),
            source: Some((region, pattern)),
        })
    } else {
        Err(syntax("unknown keyword"))
    }
}

/// Split `template WHERE clause`; the keyword only counts outside quoted
/// literals and in front of a pattern or region name
fn split_where(text: &str) -> Option<(&str, &str)> {
    const KEYWORD: &str = " WHERE ";
    let upper = text.to_ascii_uppercase();
    upper
        .match_indices(KEYWORD)
        .filter(|(at, _)| !inside_literal(&text[..*at]))
        .map(|(at, _)| (text[..at].trim(), text[at + KEYWORD.len()..].trim()))
        .find(|(_, clause)| opens_clause(clause))
}

/// Whether `prefix` ends inside an open `"..."` literal
fn inside_literal(prefix: &str) -> bool {
    let mut open = false;
    let mut escaped = false;
    for c in prefix.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => open = !open,
            _ => {}
        }
    }
    open
}

fn opens_clause(clause: &str) -> bool {
    if clause.starts_with('/') {
        return true;
    }
    let word = clause.split_whitespace().next().unwrap_or_default();
    ["LOOKBACK", "LOOKAHEAD", "GRAPH"]
        .iter()
        .any(|region| word.eq_ignore_ascii_case(region))
}

fn parse_region(clause: &str) -> Result<(Region, &str), String> {
    if clause.starts_with('/') {
        return Ok((Region::Current, clause));
    }
    let (word, rest) = clause
        .split_once(char::is_whitespace)
        .ok_or_else(|| "expected a pattern".to_string())?;
    let rest = rest.trim_start();
    match word.to_ascii_uppercase().as_str() {
        "LOOKBACK" => Ok((Region::Lookback, rest)),
        "LOOKAHEAD" => Ok((Region::Lookahead, rest)),
        "GRAPH" => {
            let inner = rest
                .strip_prefix('<')
                .ok_or_else(|| "expected <graph name>".to_string())?;
            let (name, tail) = inner
                .split_once('>')
                .ok_or_else(|| "unterminated graph name".to_string())?;
            Ok((Region::Graph(name.to_string()), tail.trim_start()))
        }
        other => Err(format!("unknown region {other}")),
    }
}

/// Split a leading `/pattern/` off `text`
fn parse_pattern(text: &str) -> Result<(Regex, &str), String> {
    let body = text
        .strip_prefix('/')
        .ok_or_else(|| "expected /pattern/".to_string())?;

    let mut escaped = false;
    let mut end = None;
    for (i, ch) in body.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '/' if !escaped => {
                end = Some(i);
                break;
            }
            _ => escaped = false,
        }
    }
    let end = end.ok_or_else(|| "unterminated pattern".to_string())?;

    let source = body[..end].replace("\\/", "/");
    let regex = Regex::new(&source).map_err(|e| e.to_string())?;
    Ok((regex, body[end + 1..].trim_start()))
}
