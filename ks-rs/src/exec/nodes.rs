//! Expression and statement nodes.

use crate::error::{ExecError, ExecErrorKind};
use crate::term::{SlotRef, Value};
use crate::types::{
    BinaryFn, CompareOp, GetterFn, IndexSetFn, MathOp, MethodFn, NativeFn, SetterFn, TypeId,
};

use super::{at, eval, invoke_user, Flow, Node, Runtime, TokenCall};

fn normal(value: Value) -> Result<Flow, ExecError> {
    Ok(Flow::Normal(value))
}

fn non_null(value: Value, what: &str, line: usize) -> Result<Value, ExecError> {
    if value.is_null() {
        Err(ExecError::new(line, ExecErrorKind::NullReference(what.to_string())))
    } else {
        Ok(value)
    }
}

// ── Values and terms ──────────────────────────────────────────────────────────

/// A literal.
pub struct Constant {
    pub value: Value,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for Constant {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, _rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        normal(self.value.deep_clone())
    }
    fn constant(&self) -> Option<Value> {
        Some(self.value.clone())
    }
    fn name(&self) -> &str {
        "constant"
    }
}

/// Read a named term.
pub struct TermRef {
    pub name: String,
    pub slot: SlotRef,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for TermRef {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        normal(rt.load(self.slot))
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// `T name [= init]`.
///
/// Runs every time control reaches it, so locals start fresh on each pass.
/// A constant initialiser is also written once after compilation and
/// becomes the term's baseline value.
pub struct Declare {
    pub name: String,
    pub slot: usize,
    pub ty: TypeId,
    pub init: Option<Node>,
    /// Without an initialiser, store the default on every execution.
    /// Top-level terms instead keep the value the script started with.
    pub fresh: bool,
    pub line: usize,
}

impl TokenCall for Declare {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let value = match &self.init {
            Some(init) => eval(init.as_ref(), rt)?,
            None if self.fresh => rt.ns().default_value(self.ty),
            None => return normal(Value::Null),
        };
        rt.store(SlotRef::Local(self.slot), value, self.line)?;
        normal(Value::Null)
    }
    fn post_compilation(&self, rt: &mut Runtime<'_>) -> Result<(), ExecError> {
        if let Some(value) = self.init.as_ref().and_then(|n| n.constant()) {
            rt.store(SlotRef::Local(self.slot), value, self.line)?;
        }
        Ok(())
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "declare"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        self.init.iter().map(|n| n.as_ref()).collect()
    }
}

/// `name = value`.
pub struct Assign {
    pub slot: SlotRef,
    pub value: Node,
    pub line: usize,
}

impl TokenCall for Assign {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let value = eval(self.value.as_ref(), rt)?;
        rt.store(self.slot, value, self.line)?;
        normal(Value::Null)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "assign"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.value.as_ref()]
    }
}

// ── Members ───────────────────────────────────────────────────────────────────

/// `recv.field`.
pub struct FieldGet {
    pub recv: Node,
    pub field: String,
    pub get: GetterFn,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for FieldGet {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let recv = non_null(eval(self.recv.as_ref(), rt)?, &self.field, self.line)?;
        let value = (self.get)(&mut rt.ctx(self.ty, self.line), &recv).map_err(at(self.line))?;
        normal(value)
    }
    fn name(&self) -> &str {
        &self.field
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.recv.as_ref()]
    }
}

/// `recv.field = value`.
pub struct FieldSet {
    pub recv: Node,
    pub field: String,
    pub set: SetterFn,
    pub value: Node,
    pub field_ty: TypeId,
    pub line: usize,
}

impl TokenCall for FieldSet {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let recv = non_null(eval(self.recv.as_ref(), rt)?, &self.field, self.line)?;
        let value = eval(self.value.as_ref(), rt)?;
        let value = rt.coerce(value, self.field_ty, self.line)?;
        (self.set)(&mut rt.ctx(TypeId::VOID, self.line), &recv, value).map_err(at(self.line))?;
        normal(Value::Null)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        &self.field
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.recv.as_ref(), self.value.as_ref()]
    }
}

/// `target[index]`.
pub struct IndexGet {
    pub target: Node,
    pub index: Node,
    pub index_ty: TypeId,
    pub get: BinaryFn,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for IndexGet {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let target = non_null(eval(self.target.as_ref(), rt)?, "[]", self.line)?;
        let index = eval(self.index.as_ref(), rt)?;
        let index = rt.coerce(index, self.index_ty, self.line)?;
        let value = (self.get)(&mut rt.ctx(self.ty, self.line), &target, &index).map_err(at(self.line))?;
        normal(value)
    }
    fn name(&self) -> &str {
        "[]"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.target.as_ref(), self.index.as_ref()]
    }
}

/// `target[index] = value`.
pub struct IndexSet {
    pub target: Node,
    pub index: Node,
    pub index_ty: TypeId,
    pub set: IndexSetFn,
    pub value: Node,
    pub elem_ty: TypeId,
    pub line: usize,
}

impl TokenCall for IndexSet {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let target = non_null(eval(self.target.as_ref(), rt)?, "[]", self.line)?;
        let index = eval(self.index.as_ref(), rt)?;
        let index = rt.coerce(index, self.index_ty, self.line)?;
        let value = eval(self.value.as_ref(), rt)?;
        let value = rt.coerce(value, self.elem_ty, self.line)?;
        (self.set)(&mut rt.ctx(TypeId::VOID, self.line), &target, &index, value)
            .map_err(at(self.line))?;
        normal(Value::Null)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "[]="
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.target.as_ref(), self.index.as_ref(), self.value.as_ref()]
    }
}

// ── Calls ─────────────────────────────────────────────────────────────────────

/// A variadic tail.
pub struct RestArgs {
    /// `Array<elem>`, the type of the collected value.
    pub array_ty: TypeId,
    pub elem: TypeId,
    pub nodes: Vec<Node>,
    /// A single argument that already is an `Array<elem>` is passed as is.
    pub passthrough: bool,
}

/// Compiled call arguments, each paired with its parameter type.
#[derive(Default)]
pub struct Args {
    pub fixed: Vec<(Node, TypeId)>,
    pub rest: Option<RestArgs>,
}

impl Args {
    /// Evaluate and convert all arguments.  A variadic tail becomes one
    /// trailing array value.
    pub fn eval(&self, rt: &mut Runtime<'_>) -> Result<Vec<Value>, ExecError> {
        let mut out = Vec::with_capacity(self.fixed.len() + 1);
        for (node, ty) in &self.fixed {
            let v = eval(node.as_ref(), rt)?;
            out.push(rt.coerce(v, *ty, node.line())?);
        }
        if let Some(rest) = &self.rest {
            if rest.passthrough {
                if let Some(node) = rest.nodes.first() {
                    out.push(eval(node.as_ref(), rt)?);
                }
            } else {
                let mut items = Vec::with_capacity(rest.nodes.len());
                for node in &rest.nodes {
                    let v = eval(node.as_ref(), rt)?;
                    items.push(rt.coerce(v, rest.elem, node.line())?);
                }
                out.push(Value::new_list(rest.array_ty, items));
            }
        }
        Ok(out)
    }

    pub fn nodes(&self) -> Vec<&dyn TokenCall> {
        let mut out: Vec<&dyn TokenCall> = self.fixed.iter().map(|(n, _)| n.as_ref()).collect();
        if let Some(rest) = &self.rest {
            out.extend(rest.nodes.iter().map(|n| n.as_ref()));
        }
        out
    }
}

/// A native function, static method, static field or constructor.
pub struct NativeCall {
    pub name: String,
    pub func: NativeFn,
    pub args: Args,
    pub ty: TypeId,
    pub statement: bool,
    pub line: usize,
}

impl TokenCall for NativeCall {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let args = self.args.eval(rt)?;
        let value = (self.func)(&mut rt.ctx(self.ty, self.line), &args).map_err(at(self.line))?;
        normal(value)
    }
    fn is_statement(&self) -> bool {
        self.statement
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        self.args.nodes()
    }
}

/// `recv.method(args)`.
pub struct MethodCall {
    pub name: String,
    pub recv: Node,
    pub func: MethodFn,
    pub args: Args,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for MethodCall {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let recv = non_null(eval(self.recv.as_ref(), rt)?, &self.name, self.line)?;
        let args = self.args.eval(rt)?;
        let value = (self.func)(&mut rt.ctx(self.ty, self.line), &recv, &args).map_err(at(self.line))?;
        normal(value)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        let mut out = vec![self.recv.as_ref()];
        out.extend(self.args.nodes());
        out
    }
}

/// A call to a script-defined function.
pub struct UserCall {
    pub name: String,
    pub index: usize,
    pub args: Args,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for UserCall {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let args = self.args.eval(rt)?;
        normal(invoke_user(rt, self.index, args, self.line)?)
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        self.args.nodes()
    }
}

// ── Operators ─────────────────────────────────────────────────────────────────

/// `value as T`.
pub struct Cast {
    pub value: Node,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for Cast {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let v = eval(self.value.as_ref(), rt)?;
        normal(v.cast_to(self.ty, rt.ns()).map_err(at(self.line))?)
    }
    fn name(&self) -> &str {
        "as"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.value.as_ref()]
    }
}

/// How a binary math node computes its result.
pub enum MathImpl {
    /// Built-in arithmetic on primitives, widened to the node's type.
    Primitive,
    /// A host operator; the right operand is converted to `rhs` first.
    Host { func: BinaryFn, rhs: TypeId },
}

pub struct BinaryMath {
    pub op: MathOp,
    pub lhs: Node,
    pub rhs: Node,
    pub ty: TypeId,
    pub imp: MathImpl,
    pub line: usize,
}

impl TokenCall for BinaryMath {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let l = eval(self.lhs.as_ref(), rt)?;
        let r = eval(self.rhs.as_ref(), rt)?;
        let value = match &self.imp {
            MathImpl::Primitive => Value::math(self.op, &l, &r, self.ty, rt.ns()),
            MathImpl::Host { func, rhs } => {
                let l = non_null(l, self.op.symbol(), self.line)?;
                let r = rt.coerce(r, *rhs, self.line)?;
                func(&mut rt.ctx(self.ty, self.line), &l, &r)
            }
        }
        .map_err(at(self.line))?;
        normal(value)
    }
    fn name(&self) -> &str {
        self.op.symbol()
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.lhs.as_ref(), self.rhs.as_ref()]
    }
}

pub struct Compare {
    pub op: CompareOp,
    pub lhs: Node,
    pub rhs: Node,
    pub line: usize,
}

impl TokenCall for Compare {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::BOOL
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let l = eval(self.lhs.as_ref(), rt)?;
        let r = eval(self.rhs.as_ref(), rt)?;
        let b = Value::compare(self.op, &l, &r, rt.ns(), rt.epsilon()).map_err(at(self.line))?;
        normal(Value::Bool(b))
    }
    fn name(&self) -> &str {
        self.op.symbol()
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.lhs.as_ref(), self.rhs.as_ref()]
    }
}

/// Evaluate `node` and convert the result to `bool`.
pub fn eval_bool(node: &dyn TokenCall, rt: &mut Runtime<'_>) -> Result<bool, ExecError> {
    let v = eval(node, rt)?;
    let v = rt.coerce(v, TypeId::BOOL, node.line())?;
    Ok(v.as_bool().unwrap_or(false))
}

/// Short-circuiting `&&` / `||`.
pub struct Logic {
    pub and: bool,
    pub lhs: Node,
    pub rhs: Node,
    pub line: usize,
}

impl TokenCall for Logic {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::BOOL
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let l = eval_bool(self.lhs.as_ref(), rt)?;
        let b = if self.and {
            l && eval_bool(self.rhs.as_ref(), rt)?
        } else {
            l || eval_bool(self.rhs.as_ref(), rt)?
        };
        normal(Value::Bool(b))
    }
    fn name(&self) -> &str {
        if self.and {
            "&&"
        } else {
            "||"
        }
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.lhs.as_ref(), self.rhs.as_ref()]
    }
}

pub struct Not {
    pub operand: Node,
    pub line: usize,
}

impl TokenCall for Not {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::BOOL
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        normal(Value::Bool(!eval_bool(self.operand.as_ref(), rt)?))
    }
    fn name(&self) -> &str {
        "!"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.operand.as_ref()]
    }
}

pub struct Negate {
    pub operand: Node,
    pub ty: TypeId,
    pub line: usize,
}

impl TokenCall for Negate {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        self.ty
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let v = eval(self.operand.as_ref(), rt)?;
        normal(v.negate(rt.ns()).map_err(at(self.line))?)
    }
    fn name(&self) -> &str {
        "neg"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        vec![self.operand.as_ref()]
    }
}
