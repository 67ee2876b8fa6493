//! Expression compilation.
//!
//! An expression is split at its lowest-precedence top-level operator,
//! searching right to left so that chains associate to the left.  From
//! loosest to tightest:
//!
//! | level | operators                         |
//! |-------|-----------------------------------|
//! | 1     | `\|\|`                            |
//! | 2     | `&&`                              |
//! | 3     | `==` `!=` `<` `<=` `>` `>=`       |
//! | 4     | `\|`                              |
//! | 5     | `^`                               |
//! | 6     | `&`                               |
//! | 7     | `+` `-`                           |
//! | 8     | `*` `/` `%`                       |
//! | 9     | unary `!` and `-`, `as`           |
//!
//! Whatever is left once no operator applies is a construction, a call, an
//! index, a term, a literal or a member access.

use crate::error::{CompileError, CompileErrorKind};
use crate::exec::nodes::{
    Args, BinaryMath, Cast, Compare, Constant, FieldGet, IndexGet, Logic, MathImpl, MethodCall,
    NativeCall, Negate, Not, TermRef, UserCall,
};
use crate::exec::{Node, TokenCall};
use crate::lexer;
use crate::term::Value;
use crate::types::{CompareOp, FieldDef, IndexDef, MathOp, TypeId};

use super::Compiler;

/// An index operator found on a type or one of its bases.
pub(crate) struct IndexAccess {
    pub def: IndexDef,
    pub index_ty: TypeId,
    pub elem_ty: TypeId,
}

/// Binary math operators, loosest first.  Each group is searched right to
/// left so equal-precedence chains associate to the left.
const MATH_GROUPS: &[&[u8]] = &[b"|", b"&", b"+-", b"*/", b"^", b"%"];

/// Characters after which `+` or `-` is a sign, not an operator.
const SIGN_CONTEXT: &[u8] = b"+-*/%|&^!<>=(,";

fn numeric_rank(ty: TypeId) -> u8 {
    match ty {
        TypeId::INT => 0,
        TypeId::UINT => 1,
        TypeId::FLOAT => 2,
        _ => 3,
    }
}

impl Compiler {
    /// Compile one expression.
    pub fn compile_expr(&mut self, text: &str) -> Result<Node, CompileError> {
        let mut text = text.trim();
        loop {
            let inner = lexer::unwrap_parens(text);
            if inner.len() == text.len() {
                break;
            }
            text = inner;
        }
        if text.is_empty() {
            return Err(self.error(CompileErrorKind::Syntax("empty expression".into())));
        }
        let masked = self.mask_generics(text);
        let line = self.line;

        // `!` negates everything after it.
        if let Some(rest) = text.strip_prefix('!').filter(|r| !r.starts_with('=')) {
            let operand = self.compile_condition_expr(rest)?;
            return Ok(Box::new(Not { operand, line }));
        }

        for (pat, and) in [("||", false), ("&&", true)] {
            if let Some(i) = masked.rfind(pat) {
                let (lhs, rhs) = self.operands(text, i, pat.len())?;
                let lhs = self.compile_condition_expr(lhs)?;
                let rhs = self.compile_condition_expr(rhs)?;
                return Ok(Box::new(Logic { and, lhs, rhs, line }));
            }
        }

        if let Some((i, op)) = find_comparison(&masked) {
            let (lhs, rhs) = self.operands(text, i, op.symbol().len())?;
            let lhs = self.compile_expr(lhs)?;
            let rhs = self.compile_expr(rhs)?;
            return self.compile_compare(op, lhs, rhs);
        }

        for group in MATH_GROUPS {
            if let Some(i) = find_math(&masked, group) {
                let op = MathOp::from_symbol(&text[i..i + 1])
                    .ok_or_else(|| self.error(CompileErrorKind::Syntax(text.to_string())))?;
                let (lhs, rhs) = self.operands(text, i, 1)?;
                let lhs = self.compile_expr(lhs)?;
                let rhs = self.compile_expr(rhs)?;
                return self.compile_math(op, lhs, rhs);
            }
        }

        if let Some(rest) = text.strip_prefix('-') {
            if Value::parse_literal(text).is_none() {
                let operand = self.compile_expr(rest)?;
                let ty = match operand.ty() {
                    TypeId::INT | TypeId::UINT => TypeId::INT,
                    t @ (TypeId::FLOAT | TypeId::DOUBLE) => t,
                    t => {
                        return Err(self.error(CompileErrorKind::UnsupportedOperator {
                            op: "-".into(),
                            ty: self.ns.name(t).to_string(),
                        }))
                    }
                };
                return Ok(Box::new(Negate { operand, ty, line }));
            }
        }

        if let Some(rest) = text.strip_prefix("new ") {
            let rest = rest.trim_start();
            if let Some(open) = self.construction_open(rest) {
                return self.compile_new(rest, open);
            }
        }

        if let Some(i) = masked.rfind(" as ") {
            let value = self.compile_expr(&text[..i])?;
            let ty = self.resolve_type(&text[i + 4..])?;
            return self.compile_cast(value, ty);
        }

        if text.ends_with(')') {
            if let Some(open) = masked.rfind('(') {
                return self.compile_call(text, &masked, open);
            }
        }

        if text.ends_with(']') {
            if let Some(open) = masked.rfind('[') {
                return self.compile_index(text, open);
            }
        }

        if let Some(value) = Value::parse_literal(text) {
            let ty = value.type_id();
            return Ok(Box::new(Constant { value, ty, line }));
        }

        if lexer::is_identifier(text) {
            return match self.lookup_term(text)? {
                Some(h) => Ok(Box::new(TermRef {
                    name: h.name,
                    slot: h.slot,
                    ty: h.ty,
                    line,
                })),
                None => Err(self.error(CompileErrorKind::UnknownTerm(text.to_string()))),
            };
        }

        if let Some(dot) = masked.rfind('.') {
            return self.compile_member(text[..dot].trim(), text[dot + 1..].trim());
        }

        Err(self.error(CompileErrorKind::Syntax(format!("cannot parse '{text}'"))))
    }

    /// Compile a `(condition)` clause of a control keyword.
    pub fn compile_condition(&mut self, text: &str) -> Result<Node, CompileError> {
        let text = text.trim();
        if !text.starts_with('(') || !text.ends_with(')') {
            return Err(self.error(CompileErrorKind::Syntax(format!(
                "expected '(condition)', found '{text}'"
            ))));
        }
        self.compile_condition_expr(text)
    }

    fn compile_condition_expr(&mut self, text: &str) -> Result<Node, CompileError> {
        let node = self.compile_expr(text)?;
        self.check_assignable(node.as_ref(), TypeId::BOOL)?;
        Ok(node)
    }

    fn operands<'t>(&self, text: &'t str, at: usize, width: usize) -> Result<(&'t str, &'t str), CompileError> {
        let (lhs, rhs) = (text[..at].trim(), text[at + width..].trim());
        if lhs.is_empty() || rhs.is_empty() {
            Err(self.error(CompileErrorKind::Syntax(format!("missing operand in '{text}'"))))
        } else {
            Ok((lhs, rhs))
        }
    }

    /// Blank a line the way [`lexer::blank`] does and additionally hide the
    /// argument lists of generic type names (`List<int>`), so their angle
    /// brackets are not mistaken for comparisons.
    pub(crate) fn mask_generics(&self, text: &str) -> String {
        let mut masked = lexer::blank(text);
        let mut from = 0;
        while let Some(rel) = masked[from..].find('<') {
            let open = from + rel;
            let word_start = masked[..open]
                .char_indices()
                .rev()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map_or(0, |(i, c)| i + c.len_utf8());
            let word = &masked[word_start..open];
            if !self.ns.is_generic_name(word) {
                from = open + 1;
                continue;
            }
            let mut depth = 0usize;
            let mut close = None;
            for (i, b) in masked.bytes().enumerate().skip(open) {
                match b {
                    b'<' => depth += 1,
                    b'>' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let Some(close) = close else { break };
            lexer::blank_range(&mut masked, open, close + 1);
            from = close + 1;
        }
        masked
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    /// Whether `lhs op rhs` is a valid comparison.
    pub fn can_compare(&self, op: CompareOp, lhs: &dyn TokenCall, rhs: &dyn TokenCall) -> bool {
        let (l, r) = (lhs.ty(), rhs.ty());
        let null = |n: &dyn TokenCall| n.constant().is_some_and(|v| v.is_null());
        if null(lhs) || null(rhs) {
            let other = if null(lhs) { r } else { l };
            op.is_equality() && (self.ns.kind(other).is_nullable() || null(lhs) && null(rhs))
        } else if l.is_numeric() && r.is_numeric() {
            true
        } else if l == r || self.ns.is_subclass_of(l, r) || self.ns.is_subclass_of(r, l) {
            l != TypeId::VOID && self.ns.def(l).compare_ops.contains(&op)
        } else {
            false
        }
    }

    fn compile_compare(&mut self, op: CompareOp, lhs: Node, rhs: Node) -> Result<Node, CompileError> {
        if !self.can_compare(op, lhs.as_ref(), rhs.as_ref()) {
            return Err(self.error(CompileErrorKind::UnsupportedOperator {
                op: op.symbol().to_string(),
                ty: self.ns.name(lhs.ty()).to_string(),
            }));
        }
        Ok(Box::new(Compare {
            op,
            lhs,
            rhs,
            line: self.line,
        }))
    }

    fn compile_math(&mut self, op: MathOp, lhs: Node, rhs: Node) -> Result<Node, CompileError> {
        let (l, r) = (lhs.ty(), rhs.ty());
        let (ty, imp) = self.math_impl(op, l, r)?;
        Ok(Box::new(BinaryMath {
            op,
            lhs,
            rhs,
            ty,
            imp,
            line: self.line,
        }))
    }

    /// Result type and implementation of `l op r`.
    fn math_impl(&mut self, op: MathOp, l: TypeId, r: TypeId) -> Result<(TypeId, MathImpl), CompileError> {
        let unsupported = |c: &Compiler, ty: TypeId| {
            c.error(CompileErrorKind::UnsupportedOperator {
                op: op.symbol().to_string(),
                ty: c.ns.name(ty).to_string(),
            })
        };

        if op == MathOp::Add
            && (l == TypeId::STRING || r == TypeId::STRING)
            && l != TypeId::VOID
            && r != TypeId::VOID
        {
            return Ok((TypeId::STRING, MathImpl::Primitive));
        }
        let primitive = if l.is_numeric() && r.is_numeric() {
            Some(if numeric_rank(l) >= numeric_rank(r) { l } else { r })
        } else if l == TypeId::BOOL && r == TypeId::BOOL {
            Some(TypeId::BOOL)
        } else {
            None
        };
        if let Some(ty) = primitive {
            return if self.ns.def(ty).math_ops.contains(&op) {
                Ok((ty, MathImpl::Primitive))
            } else {
                Err(unsupported(self, ty))
            };
        }

        for owner in self.ns.chain(l) {
            let param = self.ns.param(owner);
            let candidates: Vec<_> = self
                .ns
                .def(owner)
                .operators
                .iter()
                .filter(|o| o.op == op)
                .cloned()
                .collect();
            for def in candidates {
                let rhs = self.resolve_sig_name(&def.rhs, param)?;
                if r != TypeId::VOID && self.ns.accepts(rhs, r) {
                    let ty = self.resolve_sig_name(&def.ret, param)?;
                    return Ok((ty, MathImpl::Host { func: def.func, rhs }));
                }
            }
        }
        Err(unsupported(self, l))
    }

    fn compile_cast(&mut self, value: Node, ty: TypeId) -> Result<Node, CompileError> {
        let from = value.ty();
        let ok = from != TypeId::VOID
            && ty != TypeId::VOID
            && ((from.is_primitive() && ty.is_primitive())
                || self.ns.accepts(ty, from)
                || self.ns.is_subclass_of(ty, from));
        if !ok {
            return Err(self.error(CompileErrorKind::InvalidCast {
                from: self.ns.name(from).to_string(),
                to: self.ns.name(ty).to_string(),
            }));
        }
        Ok(Box::new(Cast {
            value,
            ty,
            line: self.line,
        }))
    }

    // ── Construction and calls ────────────────────────────────────────────────

    /// Offset of the `(` in `Type(args)` if `rest` is exactly one
    /// construction.
    fn construction_open(&self, rest: &str) -> Option<usize> {
        let masked = self.mask_generics(rest);
        if !masked.ends_with(')') {
            return None;
        }
        let open = masked.find('(')?;
        let inner = &masked[open + 1..masked.len() - 1];
        (!inner.contains(|c| c == '(' || c == ')')).then_some(open)
    }

    fn compile_new(&mut self, rest: &str, open: usize) -> Result<Node, CompileError> {
        let type_name = rest[..open].trim();
        let ty = self.resolve_type(type_name)?;
        let def = self.ns.def(ty);
        if def.is_abstract || def.constructors.is_empty() {
            return Err(self.error(CompileErrorKind::NotConstructable(self.ns.name(ty).to_string())));
        }
        let ctors = def.constructors.clone();
        let param = self.ns.param(ty);
        let mut sigs = Vec::with_capacity(ctors.len());
        for c in &ctors {
            sigs.push(self.resolve_params(&c.sig, param, ty)?);
        }
        let args = self.compile_args(&rest[open + 1..rest.len() - 1])?;
        let name = format!("new {}", self.ns.name(ty));
        let (index, args) = self.bind_args(&name, &sigs, args)?;
        Ok(Box::new(NativeCall {
            name,
            func: ctors[index].func.clone(),
            args,
            ty,
            statement: true,
            line: self.line,
        }))
    }

    fn compile_call(&mut self, text: &str, masked: &str, open: usize) -> Result<Node, CompileError> {
        let callee = text[..open].trim();
        let arg_text = &text[open + 1..text.len() - 1];
        if callee.is_empty() {
            return Err(self.error(CompileErrorKind::Syntax(format!("cannot parse '{text}'"))));
        }
        let line = self.line;

        if let Some(dot) = masked[..open].rfind('.') {
            let recv_text = text[..dot].trim();
            let member = text[dot + 1..open].trim();
            if self.ns.is_type_name(recv_text) && self.lookup_term(recv_text)?.is_none() {
                return self.compile_static_call(recv_text, member, arg_text);
            }
            return self.compile_method_call(recv_text, member, arg_text);
        }

        if let Some(&index) = self.function_names.get(callee) {
            let sig = self.function_sigs[index].clone();
            let args = self.compile_args(arg_text)?;
            let (_, args) = self.bind_args(callee, std::slice::from_ref(&sig), args)?;
            return Ok(Box::new(UserCall {
                name: callee.to_string(),
                index,
                args,
                ty: sig.ret,
                line,
            }));
        }

        let Some(funcs) = self.ns.functions(callee) else {
            return Err(self.error(CompileErrorKind::UnknownFunction(callee.to_string())));
        };
        let mut sigs = Vec::with_capacity(funcs.len());
        for f in &funcs {
            sigs.push(self.resolve_sig(&f.sig, None)?);
        }
        let args = self.compile_args(arg_text)?;
        let (index, args) = self.bind_args(callee, &sigs, args)?;
        Ok(Box::new(NativeCall {
            name: callee.to_string(),
            func: funcs[index].func.clone(),
            args,
            ty: sigs[index].ret,
            statement: true,
            line,
        }))
    }

    fn compile_static_call(&mut self, type_name: &str, member: &str, arg_text: &str) -> Result<Node, CompileError> {
        let ty = self.resolve_type(type_name)?;
        let param = self.ns.param(ty);
        let funcs: Vec<_> = self
            .ns
            .def(ty)
            .static_methods
            .iter()
            .filter(|m| m.name == member)
            .cloned()
            .collect();
        if funcs.is_empty() {
            return Err(self.error(CompileErrorKind::UnknownMember {
                ty: self.ns.name(ty).to_string(),
                member: member.to_string(),
            }));
        }
        let mut sigs = Vec::with_capacity(funcs.len());
        for f in &funcs {
            sigs.push(self.resolve_sig(&f.sig, param)?);
        }
        let args = self.compile_args(arg_text)?;
        let name = format!("{}.{member}", self.ns.name(ty));
        let (index, args) = self.bind_args(&name, &sigs, args)?;
        Ok(Box::new(NativeCall {
            name,
            func: funcs[index].func.clone(),
            args,
            ty: sigs[index].ret,
            statement: true,
            line: self.line,
        }))
    }

    fn compile_method_call(&mut self, recv_text: &str, member: &str, arg_text: &str) -> Result<Node, CompileError> {
        let recv = self.compile_expr(recv_text)?;
        let mut methods = Vec::new();
        let mut sigs = Vec::new();
        for owner in self.ns.chain(recv.ty()) {
            let param = self.ns.param(owner);
            let found: Vec<_> = self.ns.def(owner).methods_named(member).cloned().collect();
            for m in found {
                sigs.push(self.resolve_sig(&m.sig, param)?);
                methods.push(m);
            }
        }
        if methods.is_empty() {
            return Err(self.error(CompileErrorKind::UnknownMember {
                ty: self.ns.name(recv.ty()).to_string(),
                member: member.to_string(),
            }));
        }
        let args = self.compile_args(arg_text)?;
        let (index, args) = self.bind_args(member, &sigs, args)?;
        Ok(Box::new(MethodCall {
            name: member.to_string(),
            recv,
            func: methods[index].func.clone(),
            args,
            ty: sigs[index].ret,
            line: self.line,
        }))
    }

    // ── Members and indexing ──────────────────────────────────────────────────

    fn compile_index(&mut self, text: &str, open: usize) -> Result<Node, CompileError> {
        let target_text = text[..open].trim();
        if target_text.is_empty() {
            return Err(self.error(CompileErrorKind::Syntax(format!("cannot parse '{text}'"))));
        }
        let target = self.compile_expr(target_text)?;
        let access = self.find_index(target.ty())?;
        let index = self.compile_expr(&text[open + 1..text.len() - 1])?;
        self.check_assignable(index.as_ref(), access.index_ty)?;
        Ok(Box::new(IndexGet {
            target,
            index,
            index_ty: access.index_ty,
            get: access.def.get,
            ty: access.elem_ty,
            line: self.line,
        }))
    }

    fn compile_member(&mut self, recv_text: &str, member: &str) -> Result<Node, CompileError> {
        let line = self.line;
        if self.ns.is_type_name(recv_text) && self.lookup_term(recv_text)?.is_none() {
            let ty = self.resolve_type(recv_text)?;
            let param = self.ns.param(ty);
            let field = self.ns.def(ty).static_fields.iter().find(|f| f.name == member).cloned();
            let Some(field) = field else {
                return Err(self.error(CompileErrorKind::UnknownMember {
                    ty: self.ns.name(ty).to_string(),
                    member: member.to_string(),
                }));
            };
            let ret = self.resolve_sig_name(&field.sig.ret, param)?;
            return Ok(Box::new(NativeCall {
                name: format!("{}.{member}", self.ns.name(ty)),
                func: field.func,
                args: Args::default(),
                ty: ret,
                statement: false,
                line,
            }));
        }

        let recv = self.compile_expr(recv_text)?;
        let (def, ty) = self.find_field(recv.ty(), member)?;
        Ok(Box::new(FieldGet {
            recv,
            field: member.to_string(),
            get: def.get,
            ty,
            line,
        }))
    }

    /// The field `name` of `ty` or of its nearest base that has one.
    pub(crate) fn find_field(&mut self, ty: TypeId, name: &str) -> Result<(FieldDef, TypeId), CompileError> {
        for owner in self.ns.chain(ty) {
            if let Some(def) = self.ns.def(owner).field_def(name).cloned() {
                let param = self.ns.param(owner);
                let field_ty = self.resolve_sig_name(&def.ty, param)?;
                return Ok((def, field_ty));
            }
        }
        Err(self.error(CompileErrorKind::UnknownMember {
            ty: self.ns.name(ty).to_string(),
            member: name.to_string(),
        }))
    }

    /// The index operator of `ty` or of its nearest base that has one.
    pub(crate) fn find_index(&mut self, ty: TypeId) -> Result<IndexAccess, CompileError> {
        for owner in self.ns.chain(ty) {
            if let Some(def) = self.ns.def(owner).index.clone() {
                let param = self.ns.param(owner);
                let index_ty = self.resolve_sig_name(&def.index, param)?;
                let elem_ty = self.resolve_sig_name(&def.elem, param)?;
                return Ok(IndexAccess { def, index_ty, elem_ty });
            }
        }
        Err(self.error(CompileErrorKind::UnknownMember {
            ty: self.ns.name(ty).to_string(),
            member: "[]".into(),
        }))
    }
}

// ── Operator search ───────────────────────────────────────────────────────────

/// Rightmost top-level comparison operator in a masked line.
fn find_comparison(masked: &str) -> Option<(usize, CompareOp)> {
    let b = masked.as_bytes();
    let mut i = b.len();
    while i > 0 {
        i -= 1;
        match b[i] {
            b'=' if i > 0 && matches!(b[i - 1], b'=' | b'!' | b'<' | b'>') => {
                let op = CompareOp::from_symbol(&masked[i - 1..=i])?;
                return Some((i - 1, op));
            }
            b'<' | b'>' if b.get(i + 1) != Some(&b'=') => {
                let op = CompareOp::from_symbol(&masked[i..=i])?;
                return Some((i, op));
            }
            _ => {}
        }
    }
    None
}

/// Rightmost top-level binary operator from `group` in a masked line.
fn find_math(masked: &str, group: &[u8]) -> Option<usize> {
    let b = masked.as_bytes();
    (0..b.len()).rev().find(|&i| {
        let c = b[i];
        if !group.contains(&c) {
            return false;
        }
        if matches!(c, b'|' | b'&') && (b.get(i + 1) == Some(&c) || i > 0 && b[i - 1] == c) {
            return false;
        }
        if matches!(c, b'+' | b'-') {
            let prev = b[..i].iter().rev().find(|c| !c.is_ascii_whitespace());
            return prev.is_some_and(|p| !SIGN_CONTEXT.contains(p));
        }
        true
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::walk;

    fn names(node: &dyn TokenCall) -> Vec<String> {
        let mut out = Vec::new();
        walk(node, &mut |n| out.push(n.name().to_string()));
        out
    }

    fn expr(src: &str) -> Node {
        let mut c = Compiler::new();
        c.compile_expr(src).unwrap()
    }

    fn expr_err(src: &str) -> CompileErrorKind {
        let mut c = Compiler::new();
        c.compile_expr(src).err().unwrap().kind
    }

    #[test]
    fn left_associative_subtraction() {
        let n = expr("10 - 4 - 3");
        assert_eq!(names(n.as_ref()), vec!["-", "-", "constant", "constant", "constant"]);
        let lhs = n.children()[0].children().len();
        assert_eq!(lhs, 2);
    }

    #[test]
    fn multiplication_binds_tighter() {
        let n = expr("1 + 2 * 3");
        assert_eq!(n.name(), "+");
        assert_eq!(n.children()[1].name(), "*");
    }

    #[test]
    fn operators_inside_strings_are_ignored() {
        let n = expr(r#""a - b" + "c""#);
        assert_eq!(n.name(), "+");
        assert_eq!(n.ty(), TypeId::STRING);
        assert_eq!(n.children()[0].constant(), Some(Value::from("a - b")));
    }

    #[test]
    fn signs_are_not_operators() {
        let n = expr("2 * -3");
        assert_eq!(n.name(), "*");
        assert_eq!(n.children()[1].constant(), Some(Value::Int(-3)));
        let n = expr("-(2 + 3)");
        assert_eq!(n.name(), "neg");
    }

    #[test]
    fn numeric_widening() {
        assert_eq!(expr("1 + 2.5").ty(), TypeId::DOUBLE);
        assert_eq!(expr("1 + 2u").ty(), TypeId::UINT);
        assert_eq!(expr("1.5f * 2").ty(), TypeId::FLOAT);
        assert_eq!(expr("7 % 2").ty(), TypeId::INT);
    }

    #[test]
    fn comparison_and_logic() {
        let n = expr("1 < 2 && 3 >= 3 || false");
        assert_eq!(n.name(), "||");
        assert_eq!(n.children()[0].name(), "&&");
        assert_eq!(n.ty(), TypeId::BOOL);
        assert_eq!(expr("1 != 2").name(), "!=");
    }

    #[test]
    fn not_negates_the_whole_rest() {
        let n = expr("!true == false");
        assert_eq!(n.name(), "!");
        assert_eq!(n.children()[0].name(), "==");
        let n = expr("!true && false");
        assert_eq!(names(n.as_ref()), vec!["!", "&&", "constant", "constant"]);
        assert_eq!(expr("1 != 2").name(), "!=");
    }

    #[test]
    fn xor_and_modulo_bind_tightest() {
        let n = expr("2 ^ 3 * 4");
        assert_eq!(n.name(), "*");
        assert_eq!(n.children()[0].name(), "^");
        let n = expr("2 * 7 % 4");
        assert_eq!(n.name(), "*");
        assert_eq!(n.children()[1].name(), "%");
        let n = expr("1 | 2 & 3");
        assert_eq!(n.name(), "|");
    }

    #[test]
    fn construction_then_cast() {
        let n = expr("new List<int>() as object");
        assert_eq!(n.ty(), TypeId::OBJECT);
        assert_eq!(n.children()[0].name(), "new List<int>");
    }

    #[test]
    fn generic_brackets_are_not_comparisons() {
        let n = expr("new List<int>()");
        assert_eq!(n.name(), "new List<int>");
        assert!(n.is_statement());
        let n = expr("new List<int>().count < 2");
        assert_eq!(n.name(), "<");
    }

    #[test]
    fn casts() {
        assert_eq!(expr("3.7 as int").ty(), TypeId::INT);
        assert_eq!(expr("\"12\" as int").ty(), TypeId::INT);
        assert_eq!(expr("5 as object").ty(), TypeId::OBJECT);
        assert!(matches!(expr_err("true as List<int>"), CompileErrorKind::InvalidCast { .. }));
    }

    #[test]
    fn unsupported_operators() {
        assert!(matches!(
            expr_err("\"a\" - \"b\""),
            CompileErrorKind::UnsupportedOperator { .. }
        ));
        assert!(matches!(
            expr_err("1.5 & 2.5"),
            CompileErrorKind::UnsupportedOperator { .. }
        ));
        assert!(matches!(
            expr_err("true < false"),
            CompileErrorKind::UnsupportedOperator { .. }
        ));
    }

    #[test]
    fn unknown_names() {
        assert_eq!(expr_err("nope"), CompileErrorKind::UnknownTerm("nope".into()));
        assert_eq!(expr_err("nope(1)"), CompileErrorKind::UnknownFunction("nope".into()));
        assert!(matches!(expr_err("\"s\".nope"), CompileErrorKind::UnknownMember { .. }));
        assert!(matches!(expr_err("1 +"), CompileErrorKind::Syntax(_)));
    }

    #[test]
    fn abstract_types_cannot_be_constructed() {
        assert_eq!(
            expr_err("new Enumerable<int>()"),
            CompileErrorKind::NotConstructable("Enumerable<int>".into())
        );
    }

    #[test]
    fn overload_mismatch_lists_argument_types() {
        assert_eq!(
            expr_err("typeof(1, \"a\")"),
            CompileErrorKind::ArgumentMismatch {
                name: "typeof".into(),
                args: "int, string".into()
            }
        );
    }

    #[test]
    fn search_helpers() {
        assert_eq!(find_comparison("a <= b"), Some((2, CompareOp::Le)));
        assert_eq!(find_comparison("a == b"), Some((2, CompareOp::Eq)));
        assert_eq!(find_comparison("a > b"), Some((2, CompareOp::Gt)));
        assert_eq!(find_comparison("a + b"), None);
        assert_eq!(find_math("a - -b", b"+-"), Some(2));
        assert_eq!(find_math("-a", b"+-"), None);
        assert_eq!(find_math("a || b", b"|"), None);
    }
}
