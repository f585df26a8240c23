//! Working regions: the mutable sentence graph, its read-only context
//! graphs, and the shared base dataset

use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An insertion-ordered set of statements plus the namespace declarations
/// they were read with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    prefixes: Vec<String>,
    statements: IndexSet<String>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the graph holds no statements
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements in insertion order
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().map(String::as_str)
    }

    /// Namespace declarations in insertion order
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether the statement is present
    pub fn contains(&self, statement: &str) -> bool {
        self.statements.contains(statement)
    }

    /// Add a statement; returns `true` if it was not present before
    pub fn insert(&mut self, statement: impl Into<String>) -> bool {
        self.statements.insert(statement.into())
    }

    /// Remove a statement; returns `true` if it was present
    pub fn remove(&mut self, statement: &str) -> bool {
        self.statements.shift_remove(statement)
    }

    /// Keep only the statements matching the predicate; returns how many were dropped
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.statements.len();
        self.statements.retain(|statement| keep(statement));
        before - self.statements.len()
    }

    /// Record a namespace declaration once
    pub fn add_prefix(&mut self, declaration: impl Into<String>) {
        let declaration = declaration.into();
        if !self.prefixes.contains(&declaration) {
            self.prefixes.push(declaration);
        }
    }

    /// Merge another graph's declarations and statements into this one
    pub fn extend_from(&mut self, other: &Graph) {
        for prefix in &other.prefixes {
            self.add_prefix(prefix.clone());
        }
        for statement in &other.statements {
            self.statements.insert(statement.clone());
        }
    }

    /// Drop all statements and declarations
    pub fn clear(&mut self) {
        self.prefixes.clear();
        self.statements.clear();
    }
}

/// Named reference graphs loaded before the run and shared read-only by all
/// workers
#[derive(Debug, Clone, Default)]
pub struct BaseDataset {
    graphs: BTreeMap<String, Graph>,
}

impl BaseDataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Add statements to a named graph, creating it if needed
    pub fn merge(&mut self, name: impl Into<String>, graph: Graph) {
        self.graphs.entry(name.into()).or_default().extend_from(&graph);
    }

    /// Look up a named graph
    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.graphs.get(name)
    }

    /// Whether a named graph exists
    pub fn contains(&self, name: &str) -> bool {
        self.graphs.contains_key(name)
    }

    /// Graph names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    /// Number of named graphs
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether no graph was loaded
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

/// A worker's private set of regions
///
/// Only the current sentence region is mutable; rule engines read the
/// lookback, lookahead and base graphs through shared references.
#[derive(Debug, Clone)]
pub struct Workspace {
    current: Graph,
    lookback: Graph,
    lookahead: Graph,
    base: Arc<BaseDataset>,
}

impl Workspace {
    /// Create empty regions over a base dataset snapshot
    pub fn new(base: Arc<BaseDataset>) -> Self {
        Self {
            current: Graph::new(),
            lookback: Graph::new(),
            lookahead: Graph::new(),
            base,
        }
    }

    /// The sentence being transformed
    pub fn current(&self) -> &Graph {
        &self.current
    }

    /// Mutable access to the sentence being transformed
    pub fn current_mut(&mut self) -> &mut Graph {
        &mut self.current
    }

    /// Preceding sentences
    pub fn lookback(&self) -> &Graph {
        &self.lookback
    }

    /// Following sentences
    pub fn lookahead(&self) -> &Graph {
        &self.lookahead
    }

    /// Reference graphs
    pub fn base(&self) -> &BaseDataset {
        &self.base
    }

    pub(crate) fn regions_mut(&mut self) -> (&mut Graph, &mut Graph, &mut Graph) {
        (&mut self.lookback, &mut self.current, &mut self.lookahead)
    }

    /// Empty all per-sentence regions; the base dataset is kept
    pub fn clear(&mut self) {
        self.current.clear();
        self.lookback.clear();
        self.lookahead.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_keeps_insertion_order_and_dedups() {
        let mut graph = Graph::new();
        assert!(graph.insert(":b :p :c ."));
        assert!(graph.insert(":a :p :c ."));
        assert!(!graph.insert(":b :p :c ."));
        assert_eq!(graph.statements().collect::<Vec<_>>(), vec![":b :p :c .", ":a :p :c ."]);

        assert!(graph.remove(":b :p :c ."));
        assert!(!graph.remove(":b :p :c ."));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_retain_reports_dropped_count() {
        let mut graph = Graph::new();
        graph.insert(":a :IGNORE :x .");
        graph.insert(":a :WORD :x .");
        assert_eq!(graph.retain(|s| !s.contains(":IGNORE")), 1);
        assert!(graph.contains(":a :WORD :x ."));
    }

    #[test]
    fn test_base_dataset_merges_into_named_graphs() {
        let mut base = BaseDataset::new();
        let mut first = Graph::new();
        first.insert(":NN a :Noun .");
        let mut second = Graph::new();
        second.insert(":VB a :Verb .");
        base.merge("http://purl.org/olia/penn.owl", first);
        base.merge("http://purl.org/olia/penn.owl", second);

        assert_eq!(base.len(), 1);
        assert_eq!(base.graph("http://purl.org/olia/penn.owl").map(Graph::len), Some(2));
    }

    #[test]
    fn test_workspace_clear_keeps_base() {
        let mut base = BaseDataset::new();
        base.merge("g", Graph::new());
        let mut workspace = Workspace::new(Arc::new(base));
        workspace.current_mut().insert(":a :b :c .");
        workspace.clear();
        assert!(workspace.current().is_empty());
        assert!(workspace.base().contains("g"));
    }
}
