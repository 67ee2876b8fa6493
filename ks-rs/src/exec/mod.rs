//! The call-tree execution engine.
//!
//! A compiled script is a tree of [`TokenCall`] nodes.  Every node returns a
//! [`Flow`]: ordinary nodes produce `Flow::Normal(value)`, while `break`,
//! `continue` and `return` produce the other variants.  Block executors
//! ([`run_block`]) stop at the first non-normal flow and hand it to their
//! owner, which either consumes it (a loop consumes `Break`/`Continue`, a
//! function consumes `Return`) or passes it further up.
//!
//! Term storage lives in an [`Env`] that is exclusively owned by one script;
//! the compiled [`Program`] (types, functions) is shared read-only during a
//! run.  A [`Runtime`] pairs the two.

pub mod control;
pub mod nodes;

use std::ops::Range;

use tracing::trace;

use crate::config::Options;
use crate::error::{ExecError, ExecErrorKind};
use crate::namespace::Namespace;
use crate::term::{coerce, copy_by_value, SlotRef, Term, Value};
use crate::types::{HostValue, TypeId};

// ── Flow ──────────────────────────────────────────────────────────────────────

/// Result of executing one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Break,
    Continue,
    Return(Value),
}

impl Flow {
    pub fn is_normal(&self) -> bool {
        matches!(self, Flow::Normal(_))
    }
}

// ── TokenCall ─────────────────────────────────────────────────────────────────

/// One executable node of the call tree.
///
/// `pre_execution` and `post_execution` run around every `call`;
/// `post_compilation` runs once, after the whole script has compiled, and
/// may write initial term values.
pub trait TokenCall {
    /// 1-based source line, for diagnostics.
    fn line(&self) -> usize;

    /// Static type of the value `call` produces (`void` for statements).
    fn ty(&self) -> TypeId;

    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError>;

    fn pre_execution(&self, _rt: &mut Runtime<'_>) -> Result<(), ExecError> {
        Ok(())
    }

    fn post_execution(&self, _rt: &mut Runtime<'_>) -> Result<(), ExecError> {
        Ok(())
    }

    fn post_compilation(&self, _rt: &mut Runtime<'_>) -> Result<(), ExecError> {
        Ok(())
    }

    /// Whether the node may stand alone as a statement line.
    fn is_statement(&self) -> bool {
        false
    }

    /// The value of a node that always yields the same value.
    fn constant(&self) -> Option<Value> {
        None
    }

    /// Short description used by diagnostics and tests.
    fn name(&self) -> &str;

    fn children(&self) -> Vec<&dyn TokenCall> {
        Vec::new()
    }
}

pub type Node = Box<dyn TokenCall>;

/// Visit `node` and all its descendants, parents first.
pub fn walk(node: &dyn TokenCall, f: &mut dyn FnMut(&dyn TokenCall)) {
    f(node);
    for child in node.children() {
        walk(child, f);
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// Per-script mutable state.
#[derive(Debug, Clone)]
pub struct Env {
    pub terms: Vec<Term>,
    pub globals: Vec<Term>,
    pub output: String,
    pub depth: usize,
    pub options: Options,
}

impl Env {
    pub fn new(options: Options) -> Self {
        Self {
            terms: Vec::new(),
            globals: Vec::new(),
            output: String::new(),
            depth: 0,
            options,
        }
    }

    pub fn term(&self, slot: SlotRef) -> &Term {
        match slot {
            SlotRef::Local(i) => &self.terms[i],
            SlotRef::Global(i) => &self.globals[i],
        }
    }

    pub fn term_mut(&mut self, slot: SlotRef) -> &mut Term {
        match slot {
            SlotRef::Local(i) => &mut self.terms[i],
            SlotRef::Global(i) => &mut self.globals[i],
        }
    }
}

/// A user-defined function.
pub struct UserFunction {
    pub name: String,
    pub params: Vec<(usize, TypeId)>,
    /// Whether the last parameter collects a `params` tail.
    pub variadic: bool,
    pub ret: TypeId,
    pub body: Vec<Node>,
    /// Expression body of `func T f(...) = expr`.
    pub expr: Option<Node>,
    /// Term slots owned by the function (parameters and locals).
    pub slots: Range<usize>,
}

/// The immutable half of a compiled script.
pub struct Program {
    pub ns: Namespace,
    pub functions: Vec<UserFunction>,
}

// ── Runtime ───────────────────────────────────────────────────────────────────

pub struct Runtime<'a> {
    pub program: &'a Program,
    pub env: &'a mut Env,
}

impl<'a> Runtime<'a> {
    pub fn new(program: &'a Program, env: &'a mut Env) -> Self {
        Self { program, env }
    }

    pub fn ns(&self) -> &'a Namespace {
        &self.program.ns
    }

    /// Context handed to native code called from `line`.
    pub fn ctx(&mut self, ret: TypeId, line: usize) -> CallCtx<'_> {
        let program = self.program;
        CallCtx {
            ns: &program.ns,
            ret,
            output: &mut self.env.output,
            epsilon: self.env.options.float_epsilon,
            line,
        }
    }

    pub fn load(&self, slot: SlotRef) -> Value {
        self.env.term(slot).value.clone()
    }

    pub fn store(&mut self, slot: SlotRef, value: Value, line: usize) -> Result<(), ExecError> {
        let ns = self.ns();
        self.env.term_mut(slot).assign(ns, value).map_err(at(line))
    }

    /// Convert `value` for storage as `ty`.  By-value host objects are
    /// copied, so a stored argument or element never aliases its source.
    pub fn coerce(&self, value: Value, ty: TypeId, line: usize) -> Result<Value, ExecError> {
        let ns = self.ns();
        coerce(ns, value, ty).map(|v| copy_by_value(ns, v)).map_err(at(line))
    }

    pub fn epsilon(&self) -> f64 {
        self.env.options.float_epsilon
    }
}

/// Attach a line number to an error kind.
pub fn at(line: usize) -> impl Fn(ExecErrorKind) -> ExecError {
    move |kind| ExecError::new(line, kind)
}

/// Context passed to native functions, members and operators.
pub struct CallCtx<'a> {
    pub ns: &'a Namespace,
    /// Static type the call is expected to produce.
    pub ret: TypeId,
    pub output: &'a mut String,
    pub epsilon: f64,
    pub line: usize,
}

impl CallCtx<'_> {
    /// Wrap a host payload as a value of the call's result type.
    pub fn host<T: HostValue + 'static>(&self, data: T) -> Value {
        Value::host(self.ret, data)
    }

    /// A list value of the call's result type.
    pub fn list(&self, items: Vec<Value>) -> Value {
        Value::new_list(self.ret, items)
    }

    pub fn type_name(&self, value: &Value) -> String {
        if value.is_null() {
            "null".to_string()
        } else {
            self.ns.name(value.type_id()).to_string()
        }
    }

    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Run one node with its lifecycle hooks.
pub fn exec_node(node: &dyn TokenCall, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
    node.pre_execution(rt)?;
    let flow = node.call(rt)?;
    node.post_execution(rt)?;
    Ok(flow)
}

/// Evaluate an expression node to its value.
pub fn eval(node: &dyn TokenCall, rt: &mut Runtime<'_>) -> Result<Value, ExecError> {
    match exec_node(node, rt)? {
        Flow::Normal(v) | Flow::Return(v) => Ok(v),
        Flow::Break | Flow::Continue => Ok(Value::Null),
    }
}

/// Run statements in order, stopping at the first control-flow signal.
pub fn run_block(nodes: &[Node], rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
    for node in nodes {
        let flow = exec_node(node.as_ref(), rt)?;
        if !flow.is_normal() {
            return Ok(flow);
        }
    }
    Ok(Flow::Normal(Value::Null))
}

/// Call user function `index` with already-converted arguments.
///
/// The function's term slots are saved before and restored after the call,
/// so recursive invocations do not clobber their callers' locals.
pub fn invoke_user(
    rt: &mut Runtime<'_>,
    index: usize,
    args: Vec<Value>,
    line: usize,
) -> Result<Value, ExecError> {
    let program = rt.program;
    let func = &program.functions[index];
    if rt.env.depth >= rt.env.options.max_call_depth {
        return Err(ExecError::new(
            line,
            ExecErrorKind::CallDepthExceeded(rt.env.options.max_call_depth),
        ));
    }
    trace!(function = %func.name, depth = rt.env.depth, "call");

    let saved: Vec<Value> = rt.env.terms[func.slots.clone()]
        .iter()
        .map(|t| t.value.clone())
        .collect();
    rt.env.depth += 1;
    let result = run_function(func, rt, args, line);
    rt.env.depth -= 1;
    for (term, value) in rt.env.terms[func.slots.clone()].iter_mut().zip(saved) {
        term.value = value;
    }
    result
}

fn run_function(
    func: &UserFunction,
    rt: &mut Runtime<'_>,
    args: Vec<Value>,
    line: usize,
) -> Result<Value, ExecError> {
    for ((slot, _), value) in func.params.iter().zip(args) {
        rt.store(SlotRef::Local(*slot), value, line)?;
    }
    let value = match run_block(&func.body, rt)? {
        Flow::Return(v) => v,
        _ => match &func.expr {
            Some(expr) => eval(expr.as_ref(), rt)?,
            None if func.ret == TypeId::VOID => Value::Null,
            None => {
                return Err(ExecError::new(
                    line,
                    ExecErrorKind::MissingReturn(func.name.clone()),
                ))
            }
        },
    };
    if func.ret == TypeId::VOID {
        Ok(Value::Null)
    } else {
        rt.coerce(value, func.ret, line)
    }
}
