//! The compiled, immutable graph shape: one [`GraphNode`] per
//! declaration, grouped into rank buckets. Every node shares one
//! evaluation shape — read current cached dependency values, produce
//! one `Value` from a compiled AST formula — so there is a single
//! concrete node type rather than a trait-object zoo.

use crate::analyzer::{self, Analysis};
use crate::ast::{Decl, Expr, Program};
use crate::error::RippleError;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Stream,
    Sink,
}

/// One compiled declaration. `formula` is `None` only for a `source`
/// with no `:=` initializer — its value only ever comes from a push.
#[derive(Debug)]
pub struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
    pub rank: usize,
    /// Indices into `GraphShape::nodes` for same-wave (non-`pre`) upstream
    /// dependencies, in first-encounter order.
    pub dependencies: Vec<usize>,
    pub formula: Option<Expr>,
}

/// The cold, rank-ordered graph shape produced by [`compile`]. Carries
/// no runtime state of its own — [`crate::engine::Graph`] owns the
/// per-node cached values and persistent cells.
#[derive(Debug)]
pub struct GraphShape {
    pub nodes: Vec<GraphNode>,
    pub name_to_index: HashMap<String, usize>,
    /// `rank_buckets[r]` lists node indices of rank `r`, in
    /// declaration order, so equal-rank nodes settle in a fixed,
    /// deterministic order on every run.
    pub rank_buckets: Vec<Vec<usize>>,
}

impl GraphShape {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }
}

/// Builds a [`GraphShape`] from an already-analyzed program. Ranks are
/// taken from `analysis`; dependency edges are re-resolved to node
/// indices here since the analyzer works in terms of names.
pub fn build(program: &Program, analysis: &Analysis) -> GraphShape {
    let mut name_to_index = HashMap::new();
    for (i, decl) in program.decls.iter().enumerate() {
        name_to_index.insert(decl.name().to_string(), i);
    }

    let max_rank = analysis.ranks.values().copied().max().unwrap_or(0);
    let mut rank_buckets = vec![Vec::new(); max_rank + 1];

    let nodes: Vec<GraphNode> = program
        .decls
        .iter()
        .enumerate()
        .map(|(i, decl)| {
            let rank = analysis.ranks[decl.name()];
            rank_buckets[rank].push(i);
            let dependencies = analysis
                .dependencies
                .get(decl.name())
                .map(|names| names.iter().map(|n| name_to_index[n]).collect())
                .unwrap_or_default();
            GraphNode {
                name: decl.name().to_string(),
                kind: match decl {
                    Decl::Source { .. } => NodeKind::Source,
                    Decl::Stream { .. } => NodeKind::Stream,
                    Decl::Sink { .. } => NodeKind::Sink,
                },
                rank,
                dependencies,
                formula: decl.expr().cloned(),
            }
        })
        .collect();

    GraphShape {
        nodes,
        name_to_index,
        rank_buckets,
    }
}

/// Compiles source text into a validated [`GraphShape`], or the list of
/// diagnostics that failed compilation.
pub fn compile(program: &Program) -> Result<GraphShape, Vec<RippleError>> {
    let analysis = analyzer::analyze(program)?;
    Ok(build(program, &analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn builds_rank_buckets() {
        let program = Parser::parse("source A:int:=1; stream B<-A*2; sink out<-B;").unwrap();
        let analysis = analyzer::analyze(&program).unwrap();
        let graph = build(&program, &analysis);
        assert_eq!(graph.rank_buckets.len(), 3);
        assert_eq!(graph.rank_buckets[0], vec![graph.index_of("A").unwrap()]);
        assert_eq!(graph.rank_buckets[1], vec![graph.index_of("B").unwrap()]);
        assert_eq!(graph.rank_buckets[2], vec![graph.index_of("out").unwrap()]);
    }

    #[test]
    fn dependencies_resolve_to_indices() {
        let program = Parser::parse("source A:int:=1; source C:int:=2; stream B<-A+C;").unwrap();
        let analysis = analyzer::analyze(&program).unwrap();
        let graph = build(&program, &analysis);
        let b = &graph.nodes[graph.index_of("B").unwrap()];
        let a = graph.index_of("A").unwrap();
        let c = graph.index_of("C").unwrap();
        assert_eq!(b.dependencies, vec![a, c]);
    }
}
