//! The single-pass line compiler.
//!
//! The compiler owns a cursor over the source lines.  Each clean line
//! (comment stripped, trimmed, non-empty) is classified as:
//!
//! 1. a keyword line, handed to the keyword's handler, which may pull more
//!    lines (typically a `{ ... }` block through [`Compiler::read_block`]);
//! 2. a declaration, `type name [= expr]`;
//! 3. an assignment, `target = expr` or `target op= expr`;
//! 4. a bare call.
//!
//! Names, types and signatures are resolved against the script's
//! [`Namespace`] as each line is read; there is no separate syntax tree.
//! Compilation stops at the first error.

mod call;
mod expr;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::Options;
use crate::error::{CompileError, CompileErrorKind, RegistryError};
use crate::exec::nodes::{Assign, Declare, FieldSet, IndexSet};
use crate::exec::{CallCtx, Env, Node, Program, TokenCall, UserFunction};
use crate::lexer;
use crate::namespace::Namespace;
use crate::registry::{Library, Registry};
use crate::script::Script;
use crate::term::{Holder, SlotRef, Term};
use crate::types::TypeId;

pub(crate) use call::ResolvedSig;

/// Words that can never name a term.
const RESERVED: &[&str] = &["true", "false", "null", "new", "as", "in", "params"];

/// Book-keeping for the function whose body is being compiled.
struct Frame {
    index: usize,
    ret: TypeId,
    slot_start: usize,
    scope_base: usize,
    outer_loops: usize,
    outer_switches: usize,
}

pub struct Compiler {
    registry: Arc<Registry>,
    options: Options,

    lines: Vec<String>,
    cursor: usize,
    line: usize,

    ns: Namespace,
    scopes: Vec<HashMap<String, Holder>>,
    terms: Vec<Term>,
    globals: Vec<Term>,
    global_names: HashMap<String, Holder>,
    functions: Vec<UserFunction>,
    function_sigs: Vec<ResolvedSig>,
    function_names: HashMap<String, usize>,
    frame: Option<Frame>,
    loops: usize,
    switches: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler that knows only the system library.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        let ns = Namespace::new(Arc::clone(&registry));
        Self {
            registry,
            options: Options::default(),
            lines: Vec::new(),
            cursor: 0,
            line: 0,
            ns,
            scopes: vec![HashMap::new()],
            terms: Vec::new(),
            globals: Vec::new(),
            global_names: HashMap::new(),
            functions: Vec::new(),
            function_sigs: Vec::new(),
            function_names: HashMap::new(),
            frame: None,
            loops: 0,
            switches: 0,
        }
    }

    /// A compiler over the system library plus `libraries`.
    pub fn with_libraries<I>(libraries: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Library>,
    {
        Ok(Self::with_registry(Arc::new(Registry::with_libraries(libraries)?)))
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ── Entry point ───────────────────────────────────────────────────────────

    /// Compile `source` into a script.
    pub fn compile(&mut self, source: &str) -> Result<Script, CompileError> {
        self.reset(source);
        let mut nodes = Vec::new();
        while let Some(line) = self.next_line() {
            if line == "{" || line == "}" {
                return Err(self.error(CompileErrorKind::Syntax(format!("unexpected '{line}'"))));
            }
            if let Some(node) = self.compile_statement(&line)? {
                nodes.push(node);
            }
        }
        self.finish(nodes)
    }

    fn reset(&mut self, source: &str) {
        self.lines = source.lines().map(str::to_string).collect();
        self.cursor = 0;
        self.line = 0;
        self.ns = Namespace::new(Arc::clone(&self.registry));
        self.scopes = vec![HashMap::new()];
        self.terms.clear();
        self.globals.clear();
        self.global_names.clear();
        self.functions.clear();
        self.function_sigs.clear();
        self.function_names.clear();
        self.frame = None;
        self.loops = 0;
        self.switches = 0;
    }

    fn finish(&mut self, nodes: Vec<Node>) -> Result<Script, CompileError> {
        let ns = std::mem::replace(&mut self.ns, Namespace::new(Arc::clone(&self.registry)));
        let functions = std::mem::take(&mut self.functions);
        let mut names: HashMap<String, Holder> = std::mem::take(&mut self.global_names);
        if let Some(top) = self.scopes.first_mut() {
            names.extend(top.drain());
        }
        let mut env = Env::new(self.options.clone());
        env.terms = std::mem::take(&mut self.terms);
        env.globals = std::mem::take(&mut self.globals);

        debug!(
            nodes = nodes.len(),
            terms = env.terms.len(),
            globals = env.globals.len(),
            functions = functions.len(),
            "script compiled"
        );
        Script::new(Program { ns, functions }, env, nodes, names)
            .map_err(|e| CompileError::new(e.line, CompileErrorKind::Initialization(e.kind.to_string())))
    }

    // ── Line cursor ───────────────────────────────────────────────────────────

    /// Line number of the most recently read line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Build an error at the current line.
    pub fn error(&self, kind: CompileErrorKind) -> CompileError {
        CompileError::new(self.line, kind)
    }

    /// Consume and return the next clean line.
    pub fn next_line(&mut self) -> Option<String> {
        while self.cursor < self.lines.len() {
            let raw = &self.lines[self.cursor];
            self.cursor += 1;
            self.line = self.cursor;
            let clean = lexer::strip_comment(raw).trim();
            if !clean.is_empty() {
                return Some(clean.to_string());
            }
        }
        None
    }

    /// The next clean line, without consuming it.
    pub fn peek_line(&self) -> Option<String> {
        self.lines[self.cursor..]
            .iter()
            .map(|raw| lexer::strip_comment(raw).trim())
            .find(|clean| !clean.is_empty())
            .map(str::to_string)
    }

    /// Consume the `{` line that opens a block.
    pub fn expect_block_open(&mut self) -> Result<(), CompileError> {
        match self.next_line() {
            Some(l) if l == "{" => Ok(()),
            Some(l) => Err(self.error(CompileErrorKind::ExpectedBlock(l))),
            None => Err(self.error(CompileErrorKind::UnterminatedBlock)),
        }
    }

    /// Read `{`, statements, `}` in a fresh scope.
    pub fn read_block(&mut self) -> Result<Vec<Node>, CompileError> {
        self.expect_block_open()?;
        self.push_scope();
        let mut body = Vec::new();
        loop {
            let Some(line) = self.next_line() else {
                return Err(self.error(CompileErrorKind::UnterminatedBlock));
            };
            if line == "}" {
                break;
            }
            if line == "{" {
                return Err(self.error(CompileErrorKind::Syntax("unexpected '{'".into())));
            }
            if let Some(node) = self.compile_statement(&line)? {
                body.push(node);
            }
        }
        self.pop_scope();
        Ok(body)
    }

    // ── Statements ────────────────────────────────────────────────────────────

    /// Compile one clean line.  Keywords that only change compiler state
    /// (`import`, `func`) produce no node.
    pub fn compile_statement(&mut self, line: &str) -> Result<Option<Node>, CompileError> {
        let word = lexer::first_word(line);
        if let Some(handler) = self.ns.keyword(word) {
            let rest = line[word.len()..].trim();
            return handler(self, rest);
        }
        if let Some(node) = self.try_declaration(line)? {
            return Ok(Some(node));
        }
        if let Some(node) = self.try_assignment(line)? {
            return Ok(Some(node));
        }
        let node = self.compile_expr(line)?;
        if node.is_statement() {
            Ok(Some(node))
        } else {
            Err(self.error(CompileErrorKind::InvalidStatement(line.to_string())))
        }
    }

    fn try_declaration(&mut self, line: &str) -> Result<Option<Node>, CompileError> {
        let Some((first, rest)) = lexer::split_word(line) else {
            return Ok(None);
        };
        let (name, init) = match lexer::find_top_level(rest, "=") {
            Some(i) => (rest[..i].trim(), Some(rest[i + 1..].trim())),
            None => (rest.trim(), None),
        };
        if !lexer::is_identifier(name) {
            return Ok(None);
        }
        let outer = first.split('<').next().unwrap_or(first);
        if self.registry.proto(outer).is_none() {
            // `Word name` can only be a declaration.
            let known = self.function_names.contains_key(outer)
                || self.ns.functions(outer).is_some()
                || self.lookup_term(outer)?.is_some();
            if lexer::is_identifier(outer) && !known {
                return Err(self.error(CompileErrorKind::UnknownType(first.to_string())));
            }
            return Ok(None);
        }

        let ty = self.resolve_type(first)?;
        if ty == TypeId::VOID {
            return Err(self.error(CompileErrorKind::Syntax(format!("'{name}' cannot be void"))));
        }
        let init = match init {
            Some("") => return Err(self.error(CompileErrorKind::Syntax("missing initialiser".into()))),
            Some(text) => {
                let node = self.compile_expr(text)?;
                self.check_assignable(node.as_ref(), ty)?;
                Some(node)
            }
            None => None,
        };
        let fresh = !self.is_top_level();
        let slot = self.declare(name, ty)?;
        Ok(Some(Box::new(Declare {
            name: name.to_string(),
            slot,
            ty,
            init,
            fresh,
            line: self.line,
        })))
    }

    fn try_assignment(&mut self, line: &str) -> Result<Option<Node>, CompileError> {
        let Some((eq, op)) = find_assignment(line) else {
            return Ok(None);
        };
        let target = line[..eq - op.map_or(0, |_| 1)].trim();
        let value = line[eq + 1..].trim();
        if target.is_empty() || value.is_empty() {
            return Err(self.error(CompileErrorKind::Syntax(format!("incomplete assignment '{line}'"))));
        }
        let value = match op {
            Some(op) => format!("{target} {op} ({value})"),
            None => value.to_string(),
        };
        self.compile_assignment(target, &value).map(Some)
    }

    fn compile_assignment(&mut self, target: &str, value: &str) -> Result<Node, CompileError> {
        let line = self.line;
        let masked = self.mask_generics(target);

        if lexer::is_identifier(target) {
            let holder = self
                .lookup_term(target)?
                .ok_or_else(|| self.error(CompileErrorKind::UnknownTerm(target.to_string())))?;
            let value = self.compile_expr(value)?;
            self.check_assignable(value.as_ref(), holder.ty)?;
            return Ok(Box::new(Assign {
                slot: holder.slot,
                value,
                line,
            }));
        }

        if target.ends_with(']') {
            let open = masked
                .rfind('[')
                .ok_or_else(|| self.error(CompileErrorKind::InvalidTarget(target.to_string())))?;
            let recv = self.compile_expr(&target[..open])?;
            let index = self.compile_expr(&target[open + 1..target.len() - 1])?;
            let access = self.find_index(recv.ty())?;
            let set = access.def.set.clone().ok_or_else(|| {
                self.error(CompileErrorKind::ReadOnlyField {
                    ty: self.ns.name(recv.ty()).to_string(),
                    field: "[]".into(),
                })
            })?;
            self.check_assignable(index.as_ref(), access.index_ty)?;
            let value = self.compile_expr(value)?;
            self.check_assignable(value.as_ref(), access.elem_ty)?;
            return Ok(Box::new(IndexSet {
                target: recv,
                index,
                index_ty: access.index_ty,
                set,
                value,
                elem_ty: access.elem_ty,
                line,
            }));
        }

        if let Some(dot) = masked.rfind('.') {
            let (recv_text, field) = (target[..dot].trim(), target[dot + 1..].trim());
            if self.ns.is_type_name(recv_text) {
                return Err(self.error(CompileErrorKind::ReadOnlyField {
                    ty: recv_text.to_string(),
                    field: field.to_string(),
                }));
            }
            let recv = self.compile_expr(recv_text)?;
            let (def, field_ty) = self.find_field(recv.ty(), field)?;
            let set = def.set.clone().ok_or_else(|| {
                self.error(CompileErrorKind::ReadOnlyField {
                    ty: self.ns.name(recv.ty()).to_string(),
                    field: field.to_string(),
                })
            })?;
            let value = self.compile_expr(value)?;
            self.check_assignable(value.as_ref(), field_ty)?;
            return Ok(Box::new(FieldSet {
                recv,
                field: field.to_string(),
                set,
                value,
                field_ty,
                line,
            }));
        }

        Err(self.error(CompileErrorKind::InvalidTarget(target.to_string())))
    }

    // ── Types and checks ──────────────────────────────────────────────────────

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.ns
    }

    pub fn resolve_type(&mut self, name: &str) -> Result<TypeId, CompileError> {
        self.ns
            .resolve(name)
            .ok_or_else(|| self.error(CompileErrorKind::UnknownType(name.trim().to_string())))
    }

    /// Check that `node`'s value may be stored into a binding of `declared`.
    pub fn check_assignable(&self, node: &dyn TokenCall, declared: TypeId) -> Result<(), CompileError> {
        let from = node.ty();
        let is_null = node.constant().is_some_and(|v| v.is_null());
        let ok = if is_null {
            self.ns.kind(declared).is_nullable()
        } else {
            from != TypeId::VOID && self.ns.accepts(declared, from)
        };
        if ok {
            Ok(())
        } else {
            Err(self.error(CompileErrorKind::InvalidAssignment {
                declared: self.ns.name(declared).to_string(),
                source: if is_null {
                    "null".to_string()
                } else {
                    self.ns.name(from).to_string()
                },
            }))
        }
    }

    /// Activate a library for the rest of the script.
    pub fn import(&mut self, name: &str) -> Result<(), CompileError> {
        match self.ns.import(name) {
            Some(newly) => {
                debug!(library = name, newly, "import");
                Ok(())
            }
            None => Err(self.error(CompileErrorKind::UnknownLibrary(name.to_string()))),
        }
    }

    // ── Scopes and terms ──────────────────────────────────────────────────────

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// `true` outside any block or function.
    pub fn is_top_level(&self) -> bool {
        self.frame.is_none() && self.scopes.len() == 1
    }

    /// Bind `name` to a new term of type `ty` in the innermost scope.
    pub fn declare(&mut self, name: &str, ty: TypeId) -> Result<usize, CompileError> {
        if !lexer::is_identifier(name) {
            return Err(self.error(CompileErrorKind::Syntax(format!("'{name}' is not a valid name"))));
        }
        if RESERVED.contains(&name)
            || self.registry.proto(name).is_some()
            || self.registry.keyword(name).is_some()
        {
            return Err(self.error(CompileErrorKind::Syntax(format!("'{name}' is reserved"))));
        }
        let base = self.frame.as_ref().map_or(0, |f| f.scope_base);
        if self.scopes[base..].iter().any(|s| s.contains_key(name)) {
            return Err(self.error(CompileErrorKind::DuplicateDeclaration(name.to_string())));
        }
        let slot = self.terms.len();
        self.terms.push(Term::with_default(&self.ns, ty));
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Holder {
                    name: name.to_string(),
                    slot: SlotRef::Local(slot),
                    ty,
                },
            );
        }
        Ok(slot)
    }

    /// Find a term by name: innermost scope first, then library globals,
    /// which are constructed on first use.
    pub fn lookup_term(&mut self, name: &str) -> Result<Option<Holder>, CompileError> {
        if let Some(h) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return Ok(Some(h.clone()));
        }
        if let Some(h) = self.global_names.get(name) {
            return Ok(Some(h.clone()));
        }
        let Some(global) = self.ns.global(name) else {
            return Ok(None);
        };
        let ty = self
            .ns
            .resolve_in(&global.ty, None)
            .ok_or_else(|| self.error(CompileErrorKind::UnknownType(global.ty.clone())))?;
        let mut scratch = String::new();
        let mut ctx = CallCtx {
            ns: &self.ns,
            ret: ty,
            output: &mut scratch,
            epsilon: self.options.float_epsilon,
            line: self.line,
        };
        let value = (global.init)(&mut ctx)
            .and_then(|v| crate::term::coerce(&self.ns, v, ty))
            .map_err(|e| self.error(CompileErrorKind::Initialization(e.to_string())))?;
        let holder = Holder {
            name: name.to_string(),
            slot: SlotRef::Global(self.globals.len()),
            ty,
        };
        self.globals.push(Term::new(ty, value));
        self.global_names.insert(name.to_string(), holder.clone());
        Ok(Some(holder))
    }

    // ── Loops and switches ────────────────────────────────────────────────────

    pub fn enter_loop(&mut self) {
        self.loops += 1;
    }

    pub fn exit_loop(&mut self) {
        self.loops = self.loops.saturating_sub(1);
    }

    pub fn enter_switch(&mut self) {
        self.switches += 1;
    }

    pub fn exit_switch(&mut self) {
        self.switches = self.switches.saturating_sub(1);
    }

    /// Whether `continue` is allowed here.
    pub fn in_loop(&self) -> bool {
        self.loops > 0
    }

    /// Whether `break` is allowed here.
    pub fn in_breakable(&self) -> bool {
        self.loops > 0 || self.switches > 0
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// Return type of the function being compiled, `None` at script level.
    pub fn return_type(&self) -> Option<TypeId> {
        self.frame.as_ref().map(|f| f.ret)
    }

    /// Register a user function and open its body scope.  `rest` is the
    /// element type of a trailing `params` parameter, whose name is the last
    /// entry of `params`.
    pub fn begin_function(
        &mut self,
        name: &str,
        ret: TypeId,
        params: &[(String, TypeId)],
        rest: Option<TypeId>,
    ) -> Result<usize, CompileError> {
        if !self.is_top_level() {
            return Err(self.error(CompileErrorKind::Misplaced(
                "functions can only be declared at the top level".into(),
            )));
        }
        if !lexer::is_identifier(name) {
            return Err(self.error(CompileErrorKind::Syntax(format!("'{name}' is not a valid name"))));
        }
        if self.function_names.contains_key(name)
            || self.ns.functions(name).is_some()
            || self.registry.keyword(name).is_some()
        {
            return Err(self.error(CompileErrorKind::DuplicateDeclaration(name.to_string())));
        }

        let fixed: Vec<TypeId> = match rest {
            Some(_) => params[..params.len().saturating_sub(1)].iter().map(|p| p.1).collect(),
            None => params.iter().map(|p| p.1).collect(),
        };
        let index = self.functions.len();
        self.functions.push(UserFunction {
            name: name.to_string(),
            params: Vec::new(),
            variadic: rest.is_some(),
            ret,
            body: Vec::new(),
            expr: None,
            slots: 0..0,
        });
        self.function_sigs.push(ResolvedSig {
            params: fixed,
            rest,
            ret,
        });
        self.function_names.insert(name.to_string(), index);

        self.frame = Some(Frame {
            index,
            ret,
            slot_start: self.terms.len(),
            scope_base: self.scopes.len(),
            outer_loops: std::mem::take(&mut self.loops),
            outer_switches: std::mem::take(&mut self.switches),
        });
        self.push_scope();
        for (pname, pty) in params {
            let slot = self.declare(pname, *pty)?;
            self.functions[index].params.push((slot, *pty));
        }
        Ok(index)
    }

    /// Close the function opened by [`Compiler::begin_function`].
    pub fn end_function(&mut self, body: Vec<Node>, expr: Option<Node>) {
        self.pop_scope();
        if let Some(frame) = self.frame.take() {
            let func = &mut self.functions[frame.index];
            func.body = body;
            func.expr = expr;
            func.slots = frame.slot_start..self.terms.len();
            self.loops = frame.outer_loops;
            self.switches = frame.outer_switches;
        }
    }
}

/// Locate a top-level assignment `=`.  Returns its offset and, for compound
/// assignments (`+=` ...), the operator.
fn find_assignment(line: &str) -> Option<(usize, Option<char>)> {
    let blanked = lexer::blank(line);
    let b = blanked.as_bytes();
    let mut i = 0;
    while i < b.len() {
        if b[i] != b'=' {
            i += 1;
            continue;
        }
        if b.get(i + 1) == Some(&b'=') {
            i += 2;
            continue;
        }
        let prev = if i > 0 { Some(b[i - 1]) } else { None };
        match prev {
            Some(b'=' | b'!' | b'<' | b'>') => {}
            Some(c @ (b'+' | b'-' | b'*' | b'/' | b'%')) => return Some((i, Some(c as char))),
            _ => return Some((i, None)),
        }
        i += 1;
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
