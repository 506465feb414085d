//! Duplicate/undefined/cycle detection and rank assignment.
//! Stops at the first violated property, except circular-dependency
//! detection, which may report every simple cycle it finds.

use crate::ast::{Decl, Expr, ExprKind, Program};
use crate::builtins;
use crate::error::RippleError;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

/// The result of a successful analysis: every declared name's rank
/// (computed as `rank(n) = 1 + max(rank(dependency))`, 0 for sources)
/// and its direct non-`pre` dependency set, in the order free
/// identifiers were first encountered (this becomes the node's
/// `dependencies` list in the graph builder).
#[derive(Debug)]
pub struct Analysis {
    pub ranks: HashMap<String, usize>,
    pub dependencies: HashMap<String, Vec<String>>,
}

pub fn analyze(program: &Program) -> Result<Analysis, Vec<RippleError>> {
    check_duplicates(program).map_err(|e| vec![e])?;
    let declared: HashSet<&str> = program.decls.iter().map(|d| d.name()).collect();
    check_undefined(program, &declared).map_err(|e| vec![e])?;
    check_calls(program).map_err(|e| vec![e])?;
    check_source_initializers(program).map_err(|e| vec![e])?;
    let dependencies = collect_dependencies(program);
    check_cycles(&dependencies)?;
    let ranks = compute_ranks(program, &dependencies);
    Ok(Analysis { ranks, dependencies })
}

fn check_duplicates(program: &Program) -> Result<(), RippleError> {
    let mut seen: HashMap<&str, ()> = HashMap::new();
    for decl in &program.decls {
        if seen.insert(decl.name(), ()).is_some() {
            return Err(RippleError::DuplicateDefinition {
                name: decl.name().to_string(),
                span: decl.span(),
            });
        }
    }
    Ok(())
}

/// Free identifiers in `expr`, excluding lambda-bound parameters,
/// collected in first-encounter order (this ordering is what later
/// becomes the equal-rank tie-break order). `pre`'s first argument is
/// excluded by the caller when building the non-temporal dependency
/// set — here we just collect every free name, `pre`-referenced or
/// not; the caller decides which set to use.
fn free_identifiers(expr: &Expr, bound: &HashSet<String>, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Ident(name) => {
            if !bound.contains(name) && !out.contains(name) {
                out.push(name.clone());
            }
        }
        ExprKind::Binary { left, right, .. } => {
            free_identifiers(left, bound, out);
            free_identifiers(right, bound, out);
        }
        ExprKind::Unary { operand, .. } => free_identifiers(operand, bound, out),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            free_identifiers(cond, bound, out);
            free_identifiers(then_branch, bound, out);
            free_identifiers(else_branch, bound, out);
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                free_identifiers(arg, bound, out);
            }
        }
        ExprKind::Lambda(lambda) => {
            let mut inner = bound.clone();
            inner.extend(lambda.params.iter().cloned());
            free_identifiers(&lambda.body, &inner, out);
        }
        ExprKind::Pre { name, initial } => {
            // `name` itself is never a same-wave dependency;
            // `initial`'s free identifiers are.
            let _ = name;
            free_identifiers(initial, bound, out);
        }
        ExprKind::Fold {
            stream,
            initial,
            lambda,
        } => {
            free_identifiers(stream, bound, out);
            free_identifiers(initial, bound, out);
            let mut inner = bound.clone();
            inner.extend(lambda.params.iter().cloned());
            free_identifiers(&lambda.body, &inner, out);
        }
    }
}

/// Free identifiers including the name referenced by `pre`'s first
/// argument, used only for the undefined-reference check: a `pre(x,
/// v0)` still requires `x` to be a declared name, even though it is
/// not a same-wave dependency.
fn free_identifiers_including_pre_target(expr: &Expr, bound: &HashSet<String>, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Pre { name, initial } => {
            if !bound.contains(name) && !out.contains(name) {
                out.push(name.clone());
            }
            free_identifiers_including_pre_target(initial, bound, out);
        }
        ExprKind::Binary { left, right, .. } => {
            free_identifiers_including_pre_target(left, bound, out);
            free_identifiers_including_pre_target(right, bound, out);
        }
        ExprKind::Unary { operand, .. } => free_identifiers_including_pre_target(operand, bound, out),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            free_identifiers_including_pre_target(cond, bound, out);
            free_identifiers_including_pre_target(then_branch, bound, out);
            free_identifiers_including_pre_target(else_branch, bound, out);
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                free_identifiers_including_pre_target(arg, bound, out);
            }
        }
        ExprKind::Lambda(lambda) => {
            let mut inner = bound.clone();
            inner.extend(lambda.params.iter().cloned());
            free_identifiers_including_pre_target(&lambda.body, &inner, out);
        }
        ExprKind::Fold {
            stream,
            initial,
            lambda,
        } => {
            free_identifiers_including_pre_target(stream, bound, out);
            free_identifiers_including_pre_target(initial, bound, out);
            let mut inner = bound.clone();
            inner.extend(lambda.params.iter().cloned());
            free_identifiers_including_pre_target(&lambda.body, &inner, out);
        }
        ExprKind::Literal(_) | ExprKind::Ident(_) => {
            free_identifiers(expr, bound, out);
        }
    }
}

fn check_undefined(program: &Program, declared: &HashSet<&str>) -> Result<(), RippleError> {
    for decl in &program.decls {
        let Some(expr) = decl.expr() else { continue };
        let mut free = Vec::new();
        free_identifiers_including_pre_target(expr, &HashSet::new(), &mut free);
        for name in free {
            if !declared.contains(name.as_str()) {
                return Err(RippleError::UndefinedReference {
                    name,
                    in_node: decl.name().to_string(),
                    span: decl.span(),
                });
            }
        }
    }
    Ok(())
}

/// Every call in `program` names a known builtin and is passed the
/// right number of arguments, so evaluation never has to fall back on
/// a panic to handle a malformed call.
fn check_calls(program: &Program) -> Result<(), RippleError> {
    for decl in &program.decls {
        if let Some(expr) = decl.expr() {
            check_calls_in_expr(expr)?;
        }
    }
    Ok(())
}

fn check_calls_in_expr(expr: &Expr) -> Result<(), RippleError> {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Ident(_) => Ok(()),
        ExprKind::Binary { left, right, .. } => {
            check_calls_in_expr(left)?;
            check_calls_in_expr(right)
        }
        ExprKind::Unary { operand, .. } => check_calls_in_expr(operand),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            check_calls_in_expr(cond)?;
            check_calls_in_expr(then_branch)?;
            check_calls_in_expr(else_branch)
        }
        ExprKind::Call { name, args } => {
            if !builtins::is_builtin(name) {
                return Err(RippleError::UnknownBuiltin {
                    name: name.clone(),
                    span: expr.span,
                });
            }
            if let Some(expected) = builtins::arity(name) {
                if args.len() != expected {
                    return Err(RippleError::ArityMismatch {
                        name: name.clone(),
                        expected,
                        found: args.len(),
                        span: expr.span,
                    });
                }
            }
            for arg in args {
                check_calls_in_expr(arg)?;
            }
            Ok(())
        }
        ExprKind::Lambda(lambda) => check_calls_in_expr(&lambda.body),
        ExprKind::Pre { initial, .. } => check_calls_in_expr(initial),
        ExprKind::Fold {
            stream,
            initial,
            lambda,
        } => {
            check_calls_in_expr(stream)?;
            check_calls_in_expr(initial)?;
            check_calls_in_expr(&lambda.body)
        }
    }
}

/// A source's initializer may only use literals and builtin calls over
/// literals (e.g. `load_csv("path", true)`) — never reference another
/// declared name. Sources are mutated solely by external push events,
/// so wiring one into another node's dependency chain would let the
/// scheduler silently overwrite a value the host just pushed.
fn check_source_initializers(program: &Program) -> Result<(), RippleError> {
    for decl in &program.decls {
        if let Decl::Source {
            name,
            init: Some(init),
            span,
            ..
        } = decl
        {
            let mut free = Vec::new();
            free_identifiers_including_pre_target(init, &HashSet::new(), &mut free);
            if let Some(reference) = free.into_iter().next() {
                return Err(RippleError::InvalidSourceInitializer {
                    name: name.clone(),
                    reference,
                    span: *span,
                });
            }
        }
    }
    Ok(())
}

/// Non-`pre` dependency edges only: `pre(x, v0)` contributes `v0`'s
/// free identifiers to the enclosing node but not `x` itself.
fn collect_dependencies(program: &Program) -> HashMap<String, Vec<String>> {
    let mut deps = HashMap::new();
    for decl in &program.decls {
        let mut free = Vec::new();
        if let Some(expr) = decl.expr() {
            free_identifiers(expr, &HashSet::new(), &mut free);
        }
        deps.insert(decl.name().to_string(), free);
    }
    deps
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Iterative-by-node, recursive-within-a-component DFS cycle
/// detection, reporting every simple cycle found (cycle errors may
/// all be reported together rather than stopping at the first one).
fn check_cycles(dependencies: &HashMap<String, Vec<String>>) -> Result<(), Vec<RippleError>> {
    let mut mark: HashMap<&str, Mark> = dependencies.keys().map(|k| (k.as_str(), Mark::Unvisited)).collect();
    let mut errors = Vec::new();

    // Deterministic order keeps error reporting stable across runs.
    let names: Vec<&str> = dependencies.keys().map(|s| s.as_str()).sorted().collect();

    for start in &names {
        if mark[start] != Mark::Unvisited {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        dfs(start, dependencies, &mut mark, &mut path, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn dfs<'a>(
    node: &'a str,
    dependencies: &'a HashMap<String, Vec<String>>,
    mark: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    errors: &mut Vec<RippleError>,
) {
    mark.insert(node, Mark::InProgress);
    path.push(node);
    if let Some(deps) = dependencies.get(node) {
        for dep in deps {
            let dep = dep.as_str();
            let Some(dep_key) = dependencies.get_key_value(dep).map(|(k, _)| k.as_str()) else {
                continue; // undefined references are reported separately
            };
            match mark.get(dep_key).copied().unwrap_or(Mark::Unvisited) {
                Mark::Unvisited => dfs(dep_key, dependencies, mark, path, errors),
                Mark::InProgress => {
                    let start = path.iter().position(|&n| n == dep_key).unwrap();
                    let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep_key.to_string());
                    errors.push(RippleError::CircularDependency { path: cycle });
                }
                Mark::Done => {}
            }
        }
    }
    path.pop();
    mark.insert(node, Mark::Done);
}

fn compute_ranks(program: &Program, dependencies: &HashMap<String, Vec<String>>) -> HashMap<String, usize> {
    let mut ranks: HashMap<String, usize> = HashMap::new();
    let sources: HashSet<&str> = program
        .decls
        .iter()
        .filter(|d| d.is_source())
        .map(|d| d.name())
        .collect();
    for name in sources.iter() {
        ranks.insert(name.to_string(), 0);
    }

    fn rank_of(
        name: &str,
        dependencies: &HashMap<String, Vec<String>>,
        sources: &HashSet<&str>,
        ranks: &mut HashMap<String, usize>,
        visiting: &mut HashSet<String>,
    ) -> usize {
        if let Some(r) = ranks.get(name) {
            return *r;
        }
        if sources.contains(name) {
            ranks.insert(name.to_string(), 0);
            return 0;
        }
        // cycles were already rejected by check_cycles; this guards
        // against re-entering a node while its rank is being computed.
        if !visiting.insert(name.to_string()) {
            return 0;
        }
        let deps = dependencies.get(name).cloned().unwrap_or_default();
        let rank = 1 + deps
            .iter()
            .map(|d| rank_of(d, dependencies, sources, ranks, visiting))
            .max()
            .unwrap_or(0);
        // a node with no dependencies and that is not itself a source
        // still has rank 1 (`1 + max(empty) = 1 + 0`), matching the
        // spec's literal recurrence — but `unwrap_or(0)` above already
        // encodes `max(empty dependencies) = 0`.
        let rank = if deps.is_empty() { 1 } else { rank };
        visiting.remove(name);
        ranks.insert(name.to_string(), rank);
        rank
    }

    let mut visiting = HashSet::new();
    for decl in &program.decls {
        rank_of(decl.name(), dependencies, &sources, &mut ranks, &mut visiting);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze_src(src: &str) -> Result<Analysis, Vec<RippleError>> {
        let program = Parser::parse(src).unwrap();
        analyze(&program)
    }

    #[test]
    fn ranks_simple_chain() {
        let a = analyze_src("source A:int:=1; stream B<-A*2; stream C<-A+1; stream D<-B+C; sink out<-D;").unwrap();
        assert_eq!(a.ranks["A"], 0);
        assert_eq!(a.ranks["B"], 1);
        assert_eq!(a.ranks["C"], 1);
        assert_eq!(a.ranks["D"], 2);
        assert_eq!(a.ranks["out"], 3);
    }

    #[test]
    fn detects_duplicate() {
        let err = analyze_src("source A:int:=1; source A:int:=2;").unwrap_err();
        assert!(matches!(err[0], RippleError::DuplicateDefinition { .. }));
    }

    #[test]
    fn detects_undefined_reference() {
        let err = analyze_src("source A:int:=1; stream B<-A+X;").unwrap_err();
        assert!(matches!(err[0], RippleError::UndefinedReference { .. }));
    }

    #[test]
    fn detects_cycle() {
        let err = analyze_src("stream A<-B+1; stream B<-C+1; stream C<-A+1;").unwrap_err();
        assert!(matches!(err[0], RippleError::CircularDependency { .. }));
    }

    #[test]
    fn pre_breaks_cycle() {
        let a = analyze_src("source tick:int:=0; stream counter<-pre(counter,0)+1; sink out<-counter;").unwrap();
        assert_eq!(a.ranks["counter"], 1);
    }

    #[test]
    fn pre_target_must_be_declared() {
        let err = analyze_src("stream counter<-pre(missing,0)+1;").unwrap_err();
        assert!(matches!(err[0], RippleError::UndefinedReference { .. }));
    }

    #[test]
    fn lambda_params_are_bound_not_free() {
        let a = analyze_src(
            "source data:=load_csv(\"x.csv\",true); stream s<-filter(data,(row)=>len(row)>0); sink out<-s;",
        )
        .unwrap();
        assert!(!a.dependencies["s"].iter().any(|d| d == "row"));
    }

    #[test]
    fn rejects_unknown_builtin() {
        let err = analyze_src("source A:int:=1; stream B<-bogus(A); sink out<-B;").unwrap_err();
        assert!(matches!(&err[0], RippleError::UnknownBuiltin { name, .. } if name == "bogus"));
    }

    #[test]
    fn rejects_wrong_arity_call() {
        let err = analyze_src("source A:int:=1; stream B<-len(A,A); sink out<-B;").unwrap_err();
        assert!(matches!(
            &err[0],
            RippleError::ArityMismatch { name, expected: 1, found: 2, .. } if name == "len"
        ));
    }

    #[test]
    fn rejects_source_initializer_referencing_another_name() {
        let err = analyze_src("source A:int:=1; source B:int:=A+1;").unwrap_err();
        assert!(matches!(
            &err[0],
            RippleError::InvalidSourceInitializer { name, reference, .. }
                if name == "B" && reference == "A"
        ));
    }

    #[test]
    fn accepts_source_initializer_over_literal_builtin_call() {
        assert!(analyze_src("source A:=load_csv(\"x.csv\",true);").is_ok());
    }
}
