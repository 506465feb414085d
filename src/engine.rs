//! The scheduler: the public [`Graph`] type, `push`/`read`/`subscribe`,
//! and the rank-ordered propagation wave. The dirty set is one
//! `Vec<usize>` bucket per rank, iterated ascending, so a node is
//! never evaluated before any of its dependencies in the same wave.

use crate::ast::{BinOp, Expr, ExprKind, Lambda, Literal, UnOp};
use crate::builtins;
use crate::error::EvalError;
use crate::graph::{GraphShape, NodeKind};
use crate::parser::Parser;
use crate::value::{Table, Value};
use std::collections::HashMap;

/// A source span identifies a `pre`/`fold` occurrence uniquely within
/// a static AST, so it doubles as the key for that occurrence's
/// persistent cell — no separate slot-numbering pass is needed, and
/// the key stays stable regardless of which branch of a conditional
/// actually executes on a given evaluation.
type SlotKey = (usize, usize, usize); // (node_index, line, column)

/// The compiled, running program: its node table plus every piece of
/// mutable per-run state (caches, temporal cells, subscribers).
pub struct Graph {
    shape: GraphShape,
    cached_values: Vec<Value>,
    has_value: Vec<bool>,
    pre_cells: HashMap<SlotKey, Value>,
    pre_targets: HashMap<SlotKey, usize>,
    fold_cells: HashMap<SlotKey, Value>,
    back_refs: Vec<Vec<usize>>,
    subscribers: HashMap<usize, Vec<Box<dyn FnMut(&str, &Value)>>>,
    step_budget: usize,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("shape", &self.shape)
            .field("cached_values", &self.cached_values)
            .field("has_value", &self.has_value)
            .field("pre_cells", &self.pre_cells)
            .field("pre_targets", &self.pre_targets)
            .field("fold_cells", &self.fold_cells)
            .field("back_refs", &self.back_refs)
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .field("step_budget", &self.step_budget)
            .finish()
    }
}

/// Per-wave cap on node evaluations, guarding against a formula that
/// somehow keeps re-dirtying its own rank bucket. Ordinary acyclic
/// programs never come close to it.
const DEFAULT_STEP_BUDGET: usize = 100_000;

/// Turns source text into a running [`Graph`], or the diagnostics
/// collected along the way.
pub fn compile(source: &str) -> Result<Graph, crate::error::ErrorReport> {
    let program = Parser::parse(source).map_err(|e| crate::error::ErrorReport::single(source, e))?;
    let shape = crate::graph::compile(&program).map_err(|errors| crate::error::ErrorReport::new(source, errors))?;
    Ok(Graph::new(shape))
}

impl Graph {
    fn new(shape: GraphShape) -> Self {
        let n = shape.nodes.len();
        let mut back_refs = vec![Vec::new(); n];
        for (i, node) in shape.nodes.iter().enumerate() {
            for &dep in &node.dependencies {
                back_refs[dep].push(i);
            }
        }
        let mut graph = Graph {
            shape,
            cached_values: vec![Value::Null; n],
            has_value: vec![false; n],
            pre_cells: HashMap::new(),
            pre_targets: HashMap::new(),
            fold_cells: HashMap::new(),
            back_refs,
            subscribers: HashMap::new(),
            step_budget: DEFAULT_STEP_BUDGET,
        };
        graph.cold_build();
        graph
    }

    /// Overrides the per-wave step budget; mainly for tests that want
    /// to exercise `StepBudgetExceeded` without evaluating
    /// `DEFAULT_STEP_BUDGET` nodes.
    pub fn set_step_budget(&mut self, budget: usize) {
        self.step_budget = budget;
    }

    /// Visits nodes in ascending rank order and evaluates each once,
    /// populating `cached_value` before any external push is accepted.
    /// A formula that errors at this stage simply leaves the node
    /// without a value yet, the same state a source with no
    /// initializer starts in.
    fn cold_build(&mut self) {
        for rank in 0..self.shape.rank_buckets.len() {
            let indices = self.shape.rank_buckets[rank].clone();
            for index in indices {
                if let Err(e) = self.evaluate_node(index) {
                    debug!("cold build: `{}` has no value yet ({e})", self.shape.node(index).name);
                }
            }
        }
        debug!("cold build evaluated {} nodes", self.cached_values.len());
    }

    /// Returns the current value of any declared name, or `None` if
    /// it hasn't evaluated yet or doesn't exist.
    pub fn read(&self, name: &str) -> Option<Value> {
        let index = self.shape.index_of(name)?;
        self.has_value[index].then(|| self.cached_values[index].clone())
    }

    /// Registers `callback`, invoked with the sink's name and new
    /// value once per wave in which it changes, only after the wave
    /// has fully drained. Returns `false` if `sink_name` doesn't name
    /// a declared sink.
    pub fn subscribe(&mut self, sink_name: &str, callback: impl FnMut(&str, &Value) + 'static) -> bool {
        let Some(index) = self.shape.index_of(sink_name) else {
            return false;
        };
        if self.shape.node(index).kind != NodeKind::Sink {
            return false;
        }
        self.subscribers.entry(index).or_default().push(Box::new(callback));
        true
    }

    /// Pushes a new value into a source and drives one propagation
    /// wave to completion. A formula that throws preserves only *its
    /// own* previous `cached_value` and halts propagation past it;
    /// nodes the wave already updated keep those updates, and the
    /// error is returned to the caller alongside any sink
    /// notifications that did go out. The one exception is
    /// `StepBudgetExceeded`: that wave is rolled back in full and no
    /// subscriber is notified, since the engine cannot tell which
    /// partial updates a runaway wave would have settled on.
    pub fn push(&mut self, source_name: &str, value: Value) -> Result<(), EvalError> {
        let Some(source_index) = self.shape.index_of(source_name) else {
            return Err(EvalError::TypeMismatch {
                message: format!("`{source_name}` is not a declared name"),
            });
        };
        if self.shape.node(source_index).kind != NodeKind::Source {
            return Err(EvalError::TypeMismatch {
                message: format!("`{source_name}` is not a source"),
            });
        }

        let snapshot = (
            self.cached_values.clone(),
            self.has_value.clone(),
            self.pre_cells.clone(),
            self.pre_targets.clone(),
            self.fold_cells.clone(),
        );

        // Start-of-wave snapshot for every known `pre` occurrence:
        // capture each target's value as it stood at the end of the
        // previous wave, before this wave's evaluation can change it.
        for (key, &target) in &self.pre_targets {
            self.pre_cells.insert(*key, self.cached_values[target].clone());
        }

        self.cached_values[source_index] = value;
        self.has_value[source_index] = true;

        let mut queue: Vec<Vec<usize>> = vec![Vec::new(); self.shape.rank_buckets.len()];
        let mut queued = vec![false; self.cached_values.len()];
        self.enqueue_dependents(source_index, &mut queue, &mut queued);

        let mut changed_sinks = Vec::new();
        let mut steps = 0usize;
        let result = self.drain(&mut queue, &mut queued, &mut changed_sinks, &mut steps);

        if result == Err(EvalError::StepBudgetExceeded) {
            (
                self.cached_values,
                self.has_value,
                self.pre_cells,
                self.pre_targets,
                self.fold_cells,
            ) = snapshot;
            return result;
        }

        self.notify(&changed_sinks);
        result
    }

    fn enqueue_dependents(&self, index: usize, queue: &mut [Vec<usize>], queued: &mut [bool]) {
        for &dependent in &self.back_refs[index] {
            if !queued[dependent] {
                queued[dependent] = true;
                let rank = self.shape.node(dependent).rank;
                queue[rank].push(dependent);
            }
        }
    }

    /// Ascending-rank drain. A dependent's rank is always strictly
    /// greater than its dependency's, so nothing is ever re-appended
    /// to a rank bucket already fully processed. A node whose formula
    /// throws keeps its prior cache and is simply never enqueued
    /// further, so downstream nodes are not re-evaluated that wave —
    /// everything else in the wave still runs to completion.
    fn drain(
        &mut self,
        queue: &mut Vec<Vec<usize>>,
        queued: &mut [bool],
        changed_sinks: &mut Vec<usize>,
        steps: &mut usize,
    ) -> Result<(), EvalError> {
        let mut first_error = None;
        for rank in 0..queue.len() {
            let indices = queue[rank].clone();
            for index in indices {
                queued[index] = false;
                *steps += 1;
                if *steps > self.step_budget {
                    return Err(EvalError::StepBudgetExceeded);
                }
                let previous = self.cached_values[index].clone();
                let had_value = self.has_value[index];
                match self.evaluate_node(index) {
                    Ok(()) => {
                        let changed = !had_value || !self.cached_values[index].value_eq(&previous);
                        if changed {
                            if self.shape.node(index).kind == NodeKind::Sink {
                                changed_sinks.push(index);
                            }
                            self.enqueue_dependents(index, queue, queued);
                        }
                    }
                    Err(e) => {
                        debug!("node `{}` failed to evaluate: {e}", self.shape.node(index).name);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn notify(&mut self, changed_sinks: &[usize]) {
        for &index in changed_sinks {
            let value = self.cached_values[index].clone();
            let name = self.shape.node(index).name.clone();
            if let Some(callbacks) = self.subscribers.get_mut(&index) {
                for cb in callbacks.iter_mut() {
                    cb(&name, &value);
                }
            }
        }
    }

    /// Evaluates node `index`'s formula and writes the result into its
    /// cache. A source with no initializer keeps `Value::Null` until
    /// its first `push`, and is never re-evaluated here.
    fn evaluate_node(&mut self, index: usize) -> Result<(), EvalError> {
        let Some(expr) = self.shape.node(index).formula.clone() else {
            if !self.has_value[index] {
                self.cached_values[index] = Value::Null;
                self.has_value[index] = true;
            }
            return Ok(());
        };
        let mut ctx = EvalContext {
            graph: self,
            node_index: index,
            locals: Vec::new(),
        };
        let value = ctx.eval(&expr)?;
        self.cached_values[index] = value;
        self.has_value[index] = true;
        Ok(())
    }

    fn lookup(&self, name: &str, locals: &[(String, Value)]) -> Value {
        if let Some((_, v)) = locals.iter().rev().find(|(n, _)| n == name) {
            return v.clone();
        }
        match self.shape.index_of(name) {
            Some(index) if self.has_value[index] => self.cached_values[index].clone(),
            _ => Value::Null,
        }
    }
}

/// Per-evaluation state: the node being computed and its lambda-bound
/// local environment, consulted before the global cache so a lambda
/// parameter shadows a same-named declared node.
struct EvalContext<'g> {
    graph: &'g mut Graph,
    node_index: usize,
    locals: Vec<(String, Value)>,
}

impl<'g> EvalContext<'g> {
    fn slot_key(&self, expr: &Expr) -> SlotKey {
        (self.node_index, expr.span.line, expr.span.column)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal_value(lit)),
            ExprKind::Ident(name) => Ok(self.graph.lookup(name, &self.locals)),
            ExprKind::Binary { op: BinOp::And, left, right } => self.eval_and(left, right),
            ExprKind::Binary { op: BinOp::Or, left, right } => self.eval_or(left, right),
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                eval_binary(*op, &l, &r)
            }
            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match op {
                    UnOp::Neg => v.neg(),
                    UnOp::Not => v.not(),
                }
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.eval(cond)?;
                let c = c.as_bool().ok_or_else(|| EvalError::TypeMismatch {
                    message: format!("`if` condition must be bool, found {}", c.type_name()),
                })?;
                if c {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            ExprKind::Call { name, args } => self.eval_call(name, args),
            ExprKind::Lambda(_) => Err(EvalError::TypeMismatch {
                message: "a lambda cannot be evaluated outside a higher-order call".into(),
            }),
            ExprKind::Pre { name, initial } => self.eval_pre(expr, name, initial),
            ExprKind::Fold { stream, initial, lambda } => self.eval_fold(expr, stream, initial, lambda),
        }
    }

    fn eval_and(&mut self, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        let l = self.eval(left)?;
        match l.as_bool() {
            Some(false) => Ok(Value::Bool(false)),
            Some(true) => {
                let r = self.eval(right)?;
                r.as_bool().map(Value::Bool).ok_or_else(|| EvalError::TypeMismatch {
                    message: format!("`&&` expects bool, found {}", r.type_name()),
                })
            }
            None => Err(EvalError::TypeMismatch {
                message: format!("`&&` expects bool, found {}", l.type_name()),
            }),
        }
    }

    fn eval_or(&mut self, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        let l = self.eval(left)?;
        match l.as_bool() {
            Some(true) => Ok(Value::Bool(true)),
            Some(false) => {
                let r = self.eval(right)?;
                r.as_bool().map(Value::Bool).ok_or_else(|| EvalError::TypeMismatch {
                    message: format!("`||` expects bool, found {}", r.type_name()),
                })
            }
            None => Err(EvalError::TypeMismatch {
                message: format!("`||` expects bool, found {}", l.type_name()),
            }),
        }
    }

    fn eval_pre(&mut self, expr: &Expr, name: &str, initial: &Expr) -> Result<Value, EvalError> {
        let key = self.slot_key(expr);
        if let Some(v) = self.graph.pre_cells.get(&key) {
            return Ok(v.clone());
        }
        let v0 = self.eval(initial)?;
        if let Some(target) = self.graph.shape.index_of(name) {
            self.graph.pre_targets.insert(key, target);
        }
        self.graph.pre_cells.insert(key, v0.clone());
        Ok(v0)
    }

    fn eval_fold(&mut self, expr: &Expr, stream: &Expr, initial: &Expr, lambda: &Lambda) -> Result<Value, EvalError> {
        let key = self.slot_key(expr);
        if !self.graph.fold_cells.contains_key(&key) {
            let init_val = self.eval(initial)?;
            self.graph.fold_cells.insert(key, init_val);
        }
        let stream_val = self.eval(stream)?;
        let acc = self.graph.fold_cells.get(&key).unwrap().clone();
        let result = self.call_lambda(lambda, &[acc, stream_val])?;
        self.graph.fold_cells.insert(key, result.clone());
        Ok(result)
    }

    fn call_lambda(&mut self, lambda: &Lambda, args: &[Value]) -> Result<Value, EvalError> {
        let mark = self.locals.len();
        for (param, arg) in lambda.params.iter().zip(args.iter()) {
            self.locals.push((param.clone(), arg.clone()));
        }
        let result = self.eval(&lambda.body);
        self.locals.truncate(mark);
        result
    }

    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        match name {
            "filter" => self.eval_filter(args, false),
            "count_if" => self.eval_filter(args, true),
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(a)?);
                }
                builtins::call(name, &values)
            }
        }
    }

    fn eval_filter(&mut self, args: &[Expr], count_only: bool) -> Result<Value, EvalError> {
        let table_val = self.eval(&args[0])?;
        let table = match table_val {
            Value::Table(t) => t,
            other => {
                return Err(EvalError::TypeMismatch {
                    message: format!("`filter`/`count_if` expects a table, found {}", other.type_name()),
                })
            }
        };
        let ExprKind::Lambda(lambda) = &args[1].kind else {
            return Err(EvalError::TypeMismatch {
                message: "`filter`/`count_if`'s second argument must be a lambda".into(),
            });
        };

        let mut kept = Vec::new();
        let mut count = 0i64;
        for row in table.rows.iter() {
            let row_value = Value::list(row.clone());
            let keep = self.call_lambda(lambda, &[row_value])?;
            let keep = keep.as_bool().ok_or_else(|| EvalError::TypeMismatch {
                message: format!("filter predicate must return bool, found {}", keep.type_name()),
            })?;
            if keep {
                count += 1;
                if !count_only {
                    kept.push(row.clone());
                }
            }
        }

        if count_only {
            Ok(Value::Int(count))
        } else {
            Ok(Value::table(Table {
                header: table.header.clone(),
                rows: kept,
            }))
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

fn eval_binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;
    match op {
        BinOp::Add => l.add(r),
        BinOp::Sub => l.sub(r),
        BinOp::Mul => l.mul(r),
        BinOp::Div => l.div(r),
        BinOp::Mod => l.rem(r),
        BinOp::Eq => Ok(Value::Bool(l.value_eq(r))),
        BinOp::NotEq => Ok(Value::Bool(!l.value_eq(r))),
        BinOp::Lt => l.compare(r).map(|o| Value::Bool(o == Ordering::Less)),
        BinOp::LtEq => l.compare(r).map(|o| Value::Bool(o != Ordering::Greater)),
        BinOp::Gt => l.compare(r).map(|o| Value::Bool(o == Ordering::Greater)),
        BinOp::GtEq => l.compare(r).map(|o| Value::Bool(o != Ordering::Less)),
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled before operand evaluation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_build_evaluates_constants() {
        let graph = compile("source A:int:=1; stream B<-A*2; sink out<-B;").unwrap();
        assert!(matches!(graph.read("out"), Some(Value::Int(2))));
    }

    #[test]
    fn push_propagates_glitch_free() {
        let mut graph = compile("source A:int; stream B<-A+1; stream C<-A*2; stream D<-B+C; sink out<-D;").unwrap();
        graph.push("A", Value::Int(5)).unwrap();
        assert!(matches!(graph.read("out"), Some(Value::Int(16))));
    }

    #[test]
    fn pre_breaks_self_reference() {
        let mut graph = compile("source tick:bool; stream counter<-pre(counter,0)+1; sink out<-counter;").unwrap();
        assert!(matches!(graph.read("out"), Some(Value::Int(1))));
        graph.push("tick", Value::Bool(true)).unwrap();
        // `counter` has no non-`pre` dependency on `tick`, so pushing an
        // unrelated source does not re-trigger it.
        assert!(matches!(graph.read("out"), Some(Value::Int(1))));
    }

    #[test]
    fn fold_accumulates_across_pushes() {
        let mut graph =
            compile("source A:int; stream total<-fold(A,0,(acc,x)=>acc+x); sink out<-total;").unwrap();
        graph.push("A", Value::Int(3)).unwrap();
        graph.push("A", Value::Int(4)).unwrap();
        assert!(matches!(graph.read("out"), Some(Value::Int(7))));
    }

    #[test]
    fn division_by_zero_rolls_back_wave() {
        let mut graph = compile("source A:int; stream B<-10/A; sink out<-B;").unwrap();
        graph.push("A", Value::Int(2)).unwrap();
        assert!(matches!(graph.read("out"), Some(Value::Int(5))));
        let err = graph.push("A", Value::Int(0)).unwrap_err();
        assert_eq!(err, EvalError::DivisionByZero);
        // rolled back: out still shows the last successful value
        assert!(matches!(graph.read("out"), Some(Value::Int(5))));
    }

    #[test]
    fn subscribe_fires_once_per_change_after_wave() {
        let mut graph = compile("source A:int; stream B<-A+1; sink out<-B;").unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        graph.subscribe("out", move |_name, v| {
            seen_clone.borrow_mut().push(v.clone());
        });
        graph.push("A", Value::Int(1)).unwrap();
        graph.push("A", Value::Int(1)).unwrap(); // unchanged, no extra notification
        graph.push("A", Value::Int(2)).unwrap();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn step_budget_rolls_back_the_whole_wave() {
        let mut graph =
            compile("source A:int:=1; stream B<-A+1; stream C<-B+1; stream D<-C+1; sink out<-D;").unwrap();
        graph.set_step_budget(1);
        let before = graph.read("out");
        let err = graph.push("A", Value::Int(5)).unwrap_err();
        assert_eq!(err, EvalError::StepBudgetExceeded);
        assert!(matches!((graph.read("out"), before), (Some(a), Some(b)) if a.value_eq(&b)));
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let graph = compile(
            "source A:int; stream t<-filter(load_csv(\"ignored\",true),(row)=>len(row)>0); sink out<-A;",
        );
        // Compile-only smoke check: filter/count_if wiring is exercised
        // end-to-end in tests/scenarios.rs against a real CSV fixture.
        assert!(graph.is_ok());
    }
}
