//! Control-flow nodes.
//!
//! Loops consume `Break` and `Continue` from their bodies and pass `Return`
//! up.  `switch` and `match` consume `Break` only, so `continue` inside a
//! case still reaches the enclosing loop.

use crate::error::{ExecError, ExecErrorKind};
use crate::term::{SlotRef, Value};
use crate::types::{CompareOp, TypeId};

use super::nodes::eval_bool;
use super::{eval, run_block, Flow, Node, Runtime, TokenCall};

fn block_nodes(body: &[Node]) -> impl Iterator<Item = &dyn TokenCall> {
    body.iter().map(|n| n.as_ref())
}

/// Outcome of one loop iteration.
enum Step {
    Next,
    Exit,
    Propagate(Flow),
}

fn loop_step(flow: Flow) -> Step {
    match flow {
        Flow::Normal(_) | Flow::Continue => Step::Next,
        Flow::Break => Step::Exit,
        ret @ Flow::Return(_) => Step::Propagate(ret),
    }
}

// ── Conditionals ──────────────────────────────────────────────────────────────

/// `if` / `elif` / `else`.
pub struct If {
    pub branches: Vec<(Node, Vec<Node>)>,
    pub otherwise: Option<Vec<Node>>,
    pub line: usize,
}

impl TokenCall for If {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        for (cond, body) in &self.branches {
            if eval_bool(cond.as_ref(), rt)? {
                return run_block(body, rt);
            }
        }
        match &self.otherwise {
            Some(body) => run_block(body, rt),
            None => Ok(Flow::Normal(Value::Null)),
        }
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "if"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        let mut out = Vec::new();
        for (cond, body) in &self.branches {
            out.push(cond.as_ref());
            out.extend(block_nodes(body));
        }
        if let Some(body) = &self.otherwise {
            out.extend(block_nodes(body));
        }
        out
    }
}

// ── Loops ─────────────────────────────────────────────────────────────────────

pub struct While {
    pub cond: Node,
    pub body: Vec<Node>,
    pub line: usize,
}

impl TokenCall for While {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        while eval_bool(self.cond.as_ref(), rt)? {
            match loop_step(run_block(&self.body, rt)?) {
                Step::Next => continue,
                Step::Exit => break,
                Step::Propagate(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(Value::Null))
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "while"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        let mut out = vec![self.cond.as_ref()];
        out.extend(block_nodes(&self.body));
        out
    }
}

/// `foreach (T x in source)`.  Iterates over a snapshot of the source, so
/// the body may modify the list.
pub struct Foreach {
    pub var: usize,
    pub source: Node,
    pub body: Vec<Node>,
    pub line: usize,
}

impl TokenCall for Foreach {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let source = eval(self.source.as_ref(), rt)?;
        let items = source.items().ok_or_else(|| {
            ExecError::new(self.line, ExecErrorKind::NullReference("foreach source".into()))
        })?;
        for item in items {
            rt.store(SlotRef::Local(self.var), item, self.line)?;
            match loop_step(run_block(&self.body, rt)?) {
                Step::Next => continue,
                Step::Exit => break,
                Step::Propagate(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(Value::Null))
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "foreach"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        let mut out = vec![self.source.as_ref()];
        out.extend(block_nodes(&self.body));
        out
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

fn leave_switch(flow: Flow) -> Flow {
    match flow {
        Flow::Break => Flow::Normal(Value::Null),
        other => other,
    }
}

/// `switch (subject)` with constant `case` labels.
pub struct Switch {
    pub subject: Node,
    pub cases: Vec<(Value, Vec<Node>)>,
    pub default: Option<Vec<Node>>,
    pub line: usize,
}

impl TokenCall for Switch {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let subject = eval(self.subject.as_ref(), rt)?;
        for (label, body) in &self.cases {
            let hit = Value::compare(CompareOp::Eq, &subject, label, rt.ns(), rt.epsilon())
                .map_err(super::at(self.line))?;
            if hit {
                return Ok(leave_switch(run_block(body, rt)?));
            }
        }
        match &self.default {
            Some(body) => Ok(leave_switch(run_block(body, rt)?)),
            None => Ok(Flow::Normal(Value::Null)),
        }
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "switch"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        let mut out = vec![self.subject.as_ref()];
        for (_, body) in &self.cases {
            out.extend(block_nodes(body));
        }
        if let Some(body) = &self.default {
            out.extend(block_nodes(body));
        }
        out
    }
}

/// `match [(subject)]` with case expressions evaluated in order.  Without a
/// subject each case is a condition.
pub struct Match {
    pub subject: Option<Node>,
    pub cases: Vec<(Node, Vec<Node>)>,
    pub default: Option<Vec<Node>>,
    pub line: usize,
}

impl TokenCall for Match {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let subject = match &self.subject {
            Some(node) => Some(eval(node.as_ref(), rt)?),
            None => None,
        };
        for (case, body) in &self.cases {
            let hit = match &subject {
                Some(s) => {
                    let v = eval(case.as_ref(), rt)?;
                    Value::compare(CompareOp::Eq, s, &v, rt.ns(), rt.epsilon())
                        .map_err(super::at(case.line()))?
                }
                None => eval_bool(case.as_ref(), rt)?,
            };
            if hit {
                return Ok(leave_switch(run_block(body, rt)?));
            }
        }
        match &self.default {
            Some(body) => Ok(leave_switch(run_block(body, rt)?)),
            None => Ok(Flow::Normal(Value::Null)),
        }
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "match"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        let mut out: Vec<&dyn TokenCall> = self.subject.iter().map(|n| n.as_ref()).collect();
        for (case, body) in &self.cases {
            out.push(case.as_ref());
            out.extend(block_nodes(body));
        }
        if let Some(body) = &self.default {
            out.extend(block_nodes(body));
        }
        out
    }
}

// ── Jumps ─────────────────────────────────────────────────────────────────────

pub struct Return {
    pub value: Option<Node>,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for Return {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let value = match &self.value {
            Some(node) => {
                let v = eval(node.as_ref(), rt)?;
                rt.coerce(v, self.ty, self.line)?
            }
            None => Value::Null,
        };
        Ok(Flow::Return(value))
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "return"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        self.value.iter().map(|n| n.as_ref()).collect()
    }
}

pub struct Break {
    pub line: usize,
}

impl TokenCall for Break {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, _rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        Ok(Flow::Break)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "break"
    }
}

pub struct Continue {
    pub line: usize,
}

impl TokenCall for Continue {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, _rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        Ok(Flow::Continue)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "continue"
    }
}

/// `throw message`: abort the execution with a user error.
pub struct Throw {
    pub message: Node,
    pub line: usize,
}

impl TokenCall for Throw {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let msg = eval(self.message.as_ref(), rt)?;
        Err(ExecError::new(self.line, ExecErrorKind::Thrown(msg.to_string())))
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "throw"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.message.as_ref()]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::exec::nodes::Constant;
    use crate::exec::{Env, Program};
    use crate::namespace::Namespace;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn program() -> Program {
        Program {
            ns: Namespace::new(Arc::new(Registry::new())),
            functions: Vec::new(),
        }
    }

    fn constant(v: Value) -> Node {
        let ty = v.type_id();
        Box::new(Constant { value: v, ty, line: 1 })
    }

    #[test]
    fn loop_step_consumes_break_and_continue() {
        assert!(matches!(loop_step(Flow::Continue), Step::Next));
        assert!(matches!(loop_step(Flow::Break), Step::Exit));
        assert!(matches!(loop_step(Flow::Return(Value::Int(1))), Step::Propagate(_)));
    }

    #[test]
    fn while_false_never_runs_body() {
        let program = program();
        let mut env = Env::new(Options::default());
        let mut rt = Runtime::new(&program, &mut env);
        let node = While {
            cond: constant(Value::Bool(false)),
            body: vec![Box::new(Throw { message: constant(Value::from("ran")), line: 2 })],
            line: 1,
        };
        assert_eq!(node.call(&mut rt).unwrap(), Flow::Normal(Value::Null));
    }

    #[test]
    fn return_propagates_out_of_nested_blocks() {
        let program = program();
        let mut env = Env::new(Options::default());
        let mut rt = Runtime::new(&program, &mut env);
        let inner = If {
            branches: vec![(
                constant(Value::Bool(true)),
                vec![Box::new(Return { value: Some(constant(Value::Int(1))), ty: TypeId::INT, line: 3 })],
            )],
            otherwise: None,
            line: 2,
        };
        let outer = While {
            cond: constant(Value::Bool(true)),
            body: vec![Box::new(inner)],
            line: 1,
        };
        assert_eq!(outer.call(&mut rt).unwrap(), Flow::Return(Value::Int(1)));
    }

    #[test]
    fn switch_consumes_break_but_not_continue() {
        let program = program();
        let mut env = Env::new(Options::default());
        let mut rt = Runtime::new(&program, &mut env);
        let make = |jump: Node| Switch {
            subject: constant(Value::Int(2)),
            cases: vec![(Value::Int(1), vec![]), (Value::Int(2), vec![jump])],
            default: None,
            line: 1,
        };
        let s = make(Box::new(Break { line: 2 }));
        assert_eq!(s.call(&mut rt).unwrap(), Flow::Normal(Value::Null));
        let s = make(Box::new(Continue { line: 2 }));
        assert_eq!(s.call(&mut rt).unwrap(), Flow::Continue);
    }

    #[test]
    fn throw_reports_message_and_line() {
        let program = program();
        let mut env = Env::new(Options::default());
        let mut rt = Runtime::new(&program, &mut env);
        let t = Throw { message: constant(Value::from("boom")), line: 9 };
        let err = t.call(&mut rt).unwrap_err();
        assert_eq!(err, ExecError::new(9, ExecErrorKind::Thrown("boom".into())));
    }
}
