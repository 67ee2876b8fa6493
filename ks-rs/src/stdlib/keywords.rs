//! Control-flow and declaration keywords of the system library.
//!
//! Each handler receives the compiler positioned just after its own line and
//! the text following the keyword.  Block-taking keywords pull their `{ ... }`
//! through [`Compiler::read_block`].

use crate::compiler::Compiler;
use crate::error::{CompileError, CompileErrorKind};
use crate::exec::control::{Break, Continue, Foreach, If, Match, Return, Switch, Throw, While};
use crate::exec::nodes::Constant;
use crate::exec::Node;
use crate::lexer;
use crate::registry::Library;
use crate::term::Value;
use crate::types::{CompareOp, TypeId};

type Handled = Result<Option<Node>, CompileError>;

pub fn register(lib: &mut Library) {
    lib.keyword("import", import)
        .keyword("func", func)
        .keyword("return", return_kw)
        .keyword("break", break_kw)
        .keyword("continue", continue_kw)
        .keyword("throw", throw)
        .keyword("if", if_kw)
        .keyword("while", while_kw)
        .keyword("foreach", foreach)
        .keyword("switch", switch)
        .keyword("match", match_kw)
        .keyword("elif", |c, _| misplaced(c, "elif", "if"))
        .keyword("else", |c, _| misplaced(c, "else", "if"))
        .keyword("case", |c, _| misplaced(c, "case", "switch"))
        .keyword("default", |c, _| misplaced(c, "default", "switch"));
}

fn misplaced(c: &mut Compiler, word: &str, owner: &str) -> Handled {
    Err(c.error(CompileErrorKind::Misplaced(format!(
        "'{word}' without a preceding '{owner}'"
    ))))
}

fn no_argument(c: &Compiler, word: &str, rest: &str) -> Result<(), CompileError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(c.error(CompileErrorKind::Syntax(format!("unexpected '{rest}' after '{word}'"))))
    }
}

/// Strip the parentheses of a `(clause)`.
fn paren_clause<'a>(c: &Compiler, word: &str, rest: &'a str) -> Result<&'a str, CompileError> {
    let inner = lexer::unwrap_parens(rest);
    if inner.len() == rest.trim().len() {
        return Err(c.error(CompileErrorKind::Syntax(format!(
            "expected '{word} (...)', found '{word} {rest}'"
        ))));
    }
    Ok(inner)
}

// ── Declarations ──────────────────────────────────────────────────────────────

fn import(c: &mut Compiler, rest: &str) -> Handled {
    if !lexer::is_identifier(rest) {
        return Err(c.error(CompileErrorKind::Syntax(format!("expected a library name, found '{rest}'"))));
    }
    c.import(rest)?;
    Ok(None)
}

/// `func <ret> <name>(<params>)` followed by a block, or by `= <expr>`.
fn func(c: &mut Compiler, rest: &str) -> Handled {
    let blanked = lexer::blank(rest);
    let open = blanked.find('(');
    let close = open.and_then(|o| blanked[o..].find(')').map(|i| o + i));
    let (Some(open), Some(close)) = (open, close) else {
        return Err(c.error(CompileErrorKind::Syntax(format!("expected 'func type name(...)', found '{rest}'"))));
    };
    let Some((ret_text, name)) = lexer::split_word(&rest[..open]) else {
        return Err(c.error(CompileErrorKind::Syntax(format!("missing return type in '{rest}'"))));
    };
    let name = name.trim();
    let ret = c.resolve_type(ret_text)?;

    let mut params = Vec::new();
    let mut variadic = None;
    let param_text = &rest[open + 1..close];
    if !param_text.trim().is_empty() {
        for part in lexer::split_top_level(param_text, ',', 0) {
            if variadic.is_some() {
                return Err(c.error(CompileErrorKind::Syntax(
                    "'params' must be the last parameter".into(),
                )));
            }
            let part = part.trim();
            let (is_rest, decl) = match part.strip_prefix("params ") {
                Some(decl) => (true, decl.trim()),
                None => (false, part),
            };
            let Some((ty_text, pname)) = lexer::split_word(decl) else {
                return Err(c.error(CompileErrorKind::Syntax(format!("bad parameter '{part}'"))));
            };
            let ty = c.resolve_type(ty_text)?;
            if ty == TypeId::VOID {
                return Err(c.error(CompileErrorKind::Syntax(format!("parameter '{pname}' cannot be void"))));
            }
            if is_rest {
                variadic = Some(ty);
                let array = c.namespace_mut().array_of(ty);
                params.push((pname.trim().to_string(), array));
            } else {
                params.push((pname.trim().to_string(), ty));
            }
        }
    }

    let tail = rest[close + 1..].trim();
    c.begin_function(name, ret, &params, variadic)?;
    if let Some(expr) = tail.strip_prefix('=') {
        if ret == TypeId::VOID {
            return Err(c.error(CompileErrorKind::InvalidReturn(format!(
                "void function '{name}' cannot have an expression body"
            ))));
        }
        let expr = c.compile_expr(expr)?;
        c.check_assignable(expr.as_ref(), ret)?;
        c.end_function(Vec::new(), Some(expr));
    } else if tail.is_empty() {
        let body = c.read_block()?;
        c.end_function(body, None);
    } else {
        return Err(c.error(CompileErrorKind::Syntax(format!("unexpected '{tail}' after parameters"))));
    }
    Ok(None)
}

// ── Jumps ─────────────────────────────────────────────────────────────────────

fn return_kw(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let ty = c.return_type().unwrap_or(TypeId::VOID);
    if ty == TypeId::VOID {
        if !rest.is_empty() {
            let msg = match c.return_type() {
                Some(_) => "a void function cannot return a value",
                None => "a script cannot return a value",
            };
            return Err(c.error(CompileErrorKind::InvalidReturn(msg.into())));
        }
        return Ok(Some(Box::new(Return { value: None, ty, line })));
    }
    if rest.is_empty() {
        let msg = format!("expected a value of type {}", c.namespace().name(ty));
        return Err(c.error(CompileErrorKind::InvalidReturn(msg)));
    }
    let value = c.compile_expr(rest)?;
    c.check_assignable(value.as_ref(), ty)?;
    Ok(Some(Box::new(Return { value: Some(value), ty, line })))
}

fn break_kw(c: &mut Compiler, rest: &str) -> Handled {
    no_argument(c, "break", rest)?;
    if !c.in_breakable() {
        return Err(c.error(CompileErrorKind::Misplaced("'break' outside a loop or switch".into())));
    }
    Ok(Some(Box::new(Break { line: c.line() })))
}

fn continue_kw(c: &mut Compiler, rest: &str) -> Handled {
    no_argument(c, "continue", rest)?;
    if !c.in_loop() {
        return Err(c.error(CompileErrorKind::Misplaced("'continue' outside a loop".into())));
    }
    Ok(Some(Box::new(Continue { line: c.line() })))
}

fn throw(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let message = c.compile_expr(rest)?;
    c.check_assignable(message.as_ref(), TypeId::STRING)?;
    Ok(Some(Box::new(Throw { message, line })))
}

// ── Conditionals and loops ────────────────────────────────────────────────────

fn if_kw(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let cond = c.compile_condition(rest)?;
    let body = c.read_block()?;
    let mut branches = vec![(cond, body)];
    let mut otherwise = None;

    while let Some(next) = c.peek_line() {
        match lexer::first_word(&next) {
            "elif" => {
                c.next_line();
                let cond = c.compile_condition(next["elif".len()..].trim())?;
                let body = c.read_block()?;
                branches.push((cond, body));
            }
            "else" => {
                c.next_line();
                no_argument(c, "else", next["else".len()..].trim())?;
                otherwise = Some(c.read_block()?);
                break;
            }
            _ => break,
        }
    }
    Ok(Some(Box::new(If { branches, otherwise, line })))
}

fn while_kw(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let cond = c.compile_condition(rest)?;
    c.enter_loop();
    let body = c.read_block()?;
    c.exit_loop();
    Ok(Some(Box::new(While { cond, body, line })))
}

/// `foreach (<type> <name> in <expr>)`.
fn foreach(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let clause = paren_clause(c, "foreach", rest)?;
    let Some(at) = lexer::find_top_level(clause, " in ") else {
        return Err(c.error(CompileErrorKind::Syntax(format!("expected '<type> <name> in <expr>', found '{clause}'"))));
    };
    let Some((ty_text, name)) = lexer::split_word(&clause[..at]) else {
        return Err(c.error(CompileErrorKind::Syntax(format!("missing loop variable in '{clause}'"))));
    };
    let var_ty = c.resolve_type(ty_text)?;
    let source = c.compile_expr(&clause[at + 4..])?;
    let ns = c.namespace();
    let Some(elem) = ns.enumerable_elem(source.ty()) else {
        return Err(c.error(CompileErrorKind::UnsupportedOperator {
            op: "foreach".into(),
            ty: ns.name(source.ty()).to_string(),
        }));
    };
    if !ns.accepts(var_ty, elem) {
        return Err(c.error(CompileErrorKind::InvalidAssignment {
            declared: ns.name(var_ty).to_string(),
            source: ns.name(elem).to_string(),
        }));
    }

    c.push_scope();
    let var = c.declare(name.trim(), var_ty)?;
    c.enter_loop();
    let body = c.read_block()?;
    c.exit_loop();
    c.pop_scope();
    Ok(Some(Box::new(Foreach { var, source, body, line })))
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Entries of a `switch` or `match` body, one `case`/`default` line each
/// followed by its block.
fn case_entries<F>(c: &mut Compiler, mut on_case: F) -> Result<Option<Vec<Node>>, CompileError>
where
    F: FnMut(&mut Compiler, &str) -> Result<(), CompileError>,
{
    c.expect_block_open()?;
    c.enter_switch();
    let mut default = None;
    loop {
        let Some(line) = c.next_line() else {
            return Err(c.error(CompileErrorKind::UnterminatedBlock));
        };
        if line == "}" {
            break;
        }
        match lexer::first_word(&line) {
            "case" => on_case(c, line["case".len()..].trim())?,
            "default" if default.is_none() => {
                no_argument(c, "default", line["default".len()..].trim())?;
                default = Some(c.read_block()?);
            }
            "default" => {
                return Err(c.error(CompileErrorKind::DuplicateDeclaration("default".into())))
            }
            _ => {
                return Err(c.error(CompileErrorKind::Syntax(format!(
                    "expected 'case' or 'default', found '{line}'"
                ))))
            }
        }
    }
    c.exit_switch();
    Ok(default)
}

fn switch(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let subject = c.compile_expr(paren_clause(c, "switch", rest)?)?;
    let mut cases: Vec<(Value, Vec<Node>)> = Vec::new();
    let default = case_entries(c, |c, label| {
        let Some(value) = Value::parse_literal(label) else {
            return Err(c.error(CompileErrorKind::NonConstant(label.to_string())));
        };
        let probe = Constant { ty: value.type_id(), value: value.clone(), line: c.line() };
        if !c.can_compare(CompareOp::Eq, subject.as_ref(), &probe) {
            return Err(c.error(CompileErrorKind::UnsupportedOperator {
                op: "case".into(),
                ty: c.namespace().name(subject.ty()).to_string(),
            }));
        }
        if cases.iter().any(|(v, _)| *v == value) {
            return Err(c.error(CompileErrorKind::DuplicateDeclaration(label.to_string())));
        }
        let body = c.read_block()?;
        cases.push((value, body));
        Ok(())
    })?;
    Ok(Some(Box::new(Switch { subject, cases, default, line })))
}

/// `match (subject)` or bare `match`.
fn match_kw(c: &mut Compiler, rest: &str) -> Handled {
    let line = c.line();
    let subject = if rest.is_empty() {
        None
    } else {
        Some(c.compile_expr(paren_clause(c, "match", rest)?)?)
    };
    let mut cases: Vec<(Node, Vec<Node>)> = Vec::new();
    let default = case_entries(c, |c, text| {
        let case = c.compile_expr(text)?;
        match &subject {
            Some(s) if !c.can_compare(CompareOp::Eq, s.as_ref(), case.as_ref()) => {
                return Err(c.error(CompileErrorKind::UnsupportedOperator {
                    op: "case".into(),
                    ty: c.namespace().name(s.ty()).to_string(),
                }))
            }
            Some(_) => {}
            None => c.check_assignable(case.as_ref(), TypeId::BOOL)?,
        }
        let body = c.read_block()?;
        cases.push((case, body));
        Ok(())
    })?;
    Ok(Some(Box::new(Match { subject, cases, default, line })))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::error::{CompileErrorKind, ExecErrorKind};
    use crate::term::Value;

    fn output(src: &str) -> String {
        let mut script = Compiler::new().compile(src).unwrap();
        script.execute().unwrap();
        script.take_output()
    }

    fn compile_err(src: &str) -> CompileErrorKind {
        Compiler::new().compile(src).err().unwrap().kind
    }

    #[test]
    fn if_elif_else() {
        let src = "int x = 2\nif (x == 1)\n{\nprint(\"one\")\n}\nelif (x == 2)\n{\nprint(\"two\")\n}\nelse\n{\nprint(\"many\")\n}";
        assert_eq!(output(src), "two\n");
    }

    #[test]
    fn while_with_break_and_continue() {
        let src = concat!(
            "int i = 0\n",
            "while (true)\n{\n",
            "i += 1\n",
            "if (i % 2 == 0)\n{\ncontinue\n}\n",
            "if (i > 7)\n{\nbreak\n}\n",
            "print(i)\n",
            "}\n",
        );
        assert_eq!(output(src), "1\n3\n5\n7\n");
    }

    #[test]
    fn foreach_visits_items() {
        let src = "List<int> xs = new List<int>()\nxs.add(1)\nxs.add(2)\nforeach (int x in xs)\n{\nprint(x * 10)\n}";
        assert_eq!(output(src), "10\n20\n");
    }

    #[test]
    fn foreach_variable_type_checked() {
        let src = "List<string> xs = new List<string>()\nforeach (int x in xs)\n{\n}";
        assert!(matches!(compile_err(src), CompileErrorKind::InvalidAssignment { .. }));
        let src = "int n = 3\nforeach (int x in n)\n{\n}";
        assert!(matches!(compile_err(src), CompileErrorKind::UnsupportedOperator { .. }));
    }

    #[test]
    fn switch_labels_and_default() {
        let src = "int x = 3\nswitch (x)\n{\ncase 1\n{\nprint(\"a\")\n}\ncase 3\n{\nprint(\"c\")\nbreak\nprint(\"unreached\")\n}\ndefault\n{\nprint(\"d\")\n}\n}\nprint(\"after\")";
        assert_eq!(output(src), "c\nafter\n");
    }

    #[test]
    fn switch_requires_constant_labels() {
        let src = "int x = 3\nint y = 3\nswitch (x)\n{\ncase y\n{\n}\n}";
        assert_eq!(compile_err(src), CompileErrorKind::NonConstant("y".into()));
    }

    #[test]
    fn match_with_and_without_subject() {
        let src = "int x = 5\nmatch (x)\n{\ncase 2 + 2\n{\nprint(\"four\")\n}\ncase 2 + 3\n{\nprint(\"five\")\n}\n}";
        assert_eq!(output(src), "five\n");
        let src = "int x = 5\nmatch\n{\ncase x < 3\n{\nprint(\"small\")\n}\ndefault\n{\nprint(\"big\")\n}\n}";
        assert_eq!(output(src), "big\n");
    }

    #[test]
    fn misplaced_jumps() {
        assert!(matches!(compile_err("break"), CompileErrorKind::Misplaced(_)));
        assert!(matches!(compile_err("continue"), CompileErrorKind::Misplaced(_)));
        assert!(matches!(compile_err("else\n{\n}"), CompileErrorKind::Misplaced(_)));
        let src = "int x\nswitch (x)\n{\ncase 1\n{\ncontinue\n}\n}";
        assert!(matches!(compile_err(src), CompileErrorKind::Misplaced(_)));
    }

    #[test]
    fn return_rules() {
        assert!(matches!(compile_err("return 1"), CompileErrorKind::InvalidReturn(_)));
        assert!(matches!(
            compile_err("func void f()\n{\nreturn 1\n}"),
            CompileErrorKind::InvalidReturn(_)
        ));
        assert!(matches!(
            compile_err("func int f()\n{\nreturn\n}"),
            CompileErrorKind::InvalidReturn(_)
        ));
        assert_eq!(output("print(1)\nreturn\nprint(2)"), "1\n");
    }

    #[test]
    fn functions_and_expression_bodies() {
        let src = "func int sq(int x) = x * x\nfunc void show(string label, int n)\n{\nprint(label, sq(n))\n}\nshow(\"sq\", 7)";
        assert_eq!(output(src), "sq 49\n");
    }

    #[test]
    fn functions_only_at_top_level() {
        let src = "if (true)\n{\nfunc int f() = 1\n}";
        assert!(matches!(compile_err(src), CompileErrorKind::Misplaced(_)));
    }

    #[test]
    fn throw_raises_runtime_error() {
        let mut script = Compiler::new().compile("int x = 1\nthrow \"bad \" + x").unwrap();
        let err = script.execute().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ExecErrorKind::Thrown("bad 1".into()));
        assert_eq!(script.get_term("x"), Some(Value::Int(1)));
    }

    #[test]
    fn import_unknown_library() {
        assert_eq!(compile_err("import nowhere"), CompileErrorKind::UnknownLibrary("nowhere".into()));
    }
}
