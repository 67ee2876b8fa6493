//! Compiled scripts.
//!
//! A [`Script`] owns everything one compile pass produced: the namespace,
//! user functions, the top-level call nodes and the term storage.  It can be
//! executed any number of times.
//!
//! Before each execution the script's own terms are restored to the values
//! they had when compilation finished (constant initialisers applied), so
//! every run starts from the same state.  Library globals are shared state
//! and are never reset.  Hosts that want terms to survive between runs set
//! [`Options::reset_terms`](crate::config::Options) to `false`.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{ExecError, ExecErrorKind};
use crate::exec::{invoke_user, run_block, walk, Env, Flow, Node, Program, Runtime, TokenCall};
use crate::namespace::Namespace;
use crate::term::{coerce, Holder, SlotRef, Term, Value};
use crate::types::TypeId;

pub struct Script {
    program: Program,
    env: Env,
    nodes: Vec<Node>,
    /// Local term values captured after `post_compilation`.
    baseline: Vec<Term>,
    names: HashMap<String, Holder>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script").finish_non_exhaustive()
    }
}

impl Script {
    /// Run every node's `post_compilation` hook, then snapshot the terms.
    pub(crate) fn new(
        program: Program,
        mut env: Env,
        nodes: Vec<Node>,
        names: HashMap<String, Holder>,
    ) -> Result<Self, ExecError> {
        {
            let mut rt = Runtime::new(&program, &mut env);
            let mut failed = None;
            let mut visit = |node: &dyn TokenCall| {
                if failed.is_none() {
                    if let Err(e) = node.post_compilation(&mut rt) {
                        failed = Some(e);
                    }
                }
            };
            for node in &nodes {
                walk(node.as_ref(), &mut visit);
            }
            for func in &program.functions {
                for node in func.body.iter().chain(func.expr.iter()) {
                    walk(node.as_ref(), &mut visit);
                }
            }
            if let Some(e) = failed {
                return Err(e);
            }
        }
        let baseline = env.terms.clone();
        Ok(Self {
            program,
            env,
            nodes,
            baseline,
            names,
        })
    }

    /// Run the top-level nodes in order.
    ///
    /// A top-level `return` ends the run early.  Output accumulates across
    /// runs until [`Script::take_output`] drains it.
    pub fn execute(&mut self) -> Result<(), ExecError> {
        if self.env.options.reset_terms {
            for (term, base) in self.env.terms.iter_mut().zip(&self.baseline) {
                term.value = base.value.deep_clone();
            }
        }
        self.env.depth = 0;
        trace!(nodes = self.nodes.len(), "execute");
        let mut rt = Runtime::new(&self.program, &mut self.env);
        match run_block(&self.nodes, &mut rt)? {
            Flow::Normal(_) | Flow::Return(_) => Ok(()),
            // Rejected by the compiler outside loops and switches.
            Flow::Break | Flow::Continue => Ok(()),
        }
    }

    pub fn output(&self) -> &str {
        &self.env.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.env.output)
    }

    /// Current value of a top-level term or an imported global.
    pub fn get_term(&self, name: &str) -> Option<Value> {
        self.names
            .get(name)
            .map(|h| self.env.term(h.slot).value.clone())
    }

    /// Declared type name of a term.
    pub fn term_type(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(|h| self.program.ns.name(h.ty))
    }

    /// Store `value` into a term using the script's assignment rules.
    ///
    /// A script term set this way also becomes its starting value for later
    /// executions.
    pub fn set_term(&mut self, name: &str, value: Value) -> Result<(), ExecError> {
        let holder = self
            .names
            .get(name)
            .ok_or_else(|| ExecError::new(0, ExecErrorKind::UnknownTerm(name.to_string())))?;
        let ns = &self.program.ns;
        self.env
            .term_mut(holder.slot)
            .assign(ns, value)
            .map_err(|kind| ExecError::new(0, kind))?;
        if let SlotRef::Local(i) = holder.slot {
            self.baseline[i] = self.env.terms[i].clone();
        }
        Ok(())
    }

    /// Call a user function from the host.
    ///
    /// Arguments are converted to the declared parameter types; surplus
    /// arguments of a `params` function are collected into its array.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExecError> {
        let fail = |kind| ExecError::new(0, kind);
        let index = self
            .program
            .functions
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| fail(ExecErrorKind::Native(format!("unknown function '{name}'"))))?;
        let ns = &self.program.ns;
        let func = &self.program.functions[index];
        let fixed = if func.variadic {
            func.params.len() - 1
        } else {
            func.params.len()
        };
        if args.len() < fixed || (!func.variadic && args.len() != fixed) {
            return Err(fail(ExecErrorKind::Native(format!(
                "function '{name}' expects {} arguments, got {}",
                func.params.len(),
                args.len()
            ))));
        }

        let mut args = args.into_iter();
        let mut converted = Vec::with_capacity(func.params.len());
        for ((_, ty), value) in func.params[..fixed].iter().zip(args.by_ref()) {
            converted.push(coerce(ns, value, *ty).map_err(fail)?);
        }
        if func.variadic {
            let array_ty = func.params[fixed].1;
            let elem = ns.param(array_ty).unwrap_or(TypeId::OBJECT);
            let rest = args
                .map(|v| coerce(ns, v, elem))
                .collect::<Result<Vec<_>, _>>()
                .map_err(fail)?;
            converted.push(Value::new_list(array_ty, rest));
        }

        self.env.depth = 0;
        let mut rt = Runtime::new(&self.program, &mut self.env);
        invoke_user(&mut rt, index, converted, 0)
    }

    /// The compiled top-level nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn namespace(&self) -> &Namespace {
        &self.program.ns
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::config::Options;
    use crate::error::ExecErrorKind;
    use crate::term::Value;

    #[test]
    fn terms_reset_between_runs() {
        let mut script = Compiler::new()
            .compile("int n = 1\nint m\nm = m + n\nn = n + 10")
            .unwrap();
        script.execute().unwrap();
        assert_eq!(script.get_term("n"), Some(Value::Int(11)));
        script.execute().unwrap();
        assert_eq!(script.get_term("n"), Some(Value::Int(11)));
        assert_eq!(script.get_term("m"), Some(Value::Int(1)));
    }

    #[test]
    fn terms_persist_without_reset() {
        let mut options = Options::default();
        options.reset_terms = false;
        let mut script = Compiler::new()
            .with_options(options)
            .compile("int total\nint step = 2\ntotal = total + step")
            .unwrap();
        script.execute().unwrap();
        script.execute().unwrap();
        assert_eq!(script.get_term("total"), Some(Value::Int(4)));
    }

    #[test]
    fn constant_initialisers_are_visible_before_execution() {
        let script = Compiler::new().compile("string s = \"ready\"\ndouble d").unwrap();
        assert_eq!(script.get_term("s"), Some(Value::from("ready")));
        assert_eq!(script.get_term("d"), Some(Value::Double(0.0)));
        assert_eq!(script.term_type("d"), Some("double"));
    }

    #[test]
    fn set_term_converts_and_becomes_baseline() {
        let mut script = Compiler::new()
            .compile("double limit\nprint(limit * 2.0)")
            .unwrap();
        script.set_term("limit", Value::Int(4)).unwrap();
        assert_eq!(script.get_term("limit"), Some(Value::Double(4.0)));
        script.execute().unwrap();
        script.execute().unwrap();
        assert_eq!(script.take_output(), "8\n8\n");

        let err = script.set_term("limit", Value::from("x")).unwrap_err();
        assert!(matches!(err.kind, ExecErrorKind::InvalidAssignment { .. }));
        let err = script.set_term("nope", Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::UnknownTerm("nope".into()));
    }

    #[test]
    fn top_level_return_stops_execution() {
        let mut script = Compiler::new().compile("print(1)\nreturn\nprint(2)").unwrap();
        script.execute().unwrap();
        assert_eq!(script.output(), "1\n");
    }

    #[test]
    fn host_calls_user_functions() {
        let src = concat!(
            "func int add(int a, int b) = a + b\n",
            "func int sum(params int xs)\n",
            "{\n",
            "    int total\n",
            "    foreach (int x in xs)\n",
            "    {\n",
            "        total += x\n",
            "    }\n",
            "    return total\n",
            "}\n",
        );
        let mut script = Compiler::new().compile(src).unwrap();
        assert_eq!(script.call("add", vec![Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        let all = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        assert_eq!(script.call("sum", all), Ok(Value::Int(6)));
        assert_eq!(script.call("sum", Vec::new()), Ok(Value::Int(0)));
        assert!(script.call("add", vec![Value::Int(1)]).is_err());
        assert!(script.call("missing", Vec::new()).is_err());
    }

    #[test]
    fn runtime_errors_carry_lines() {
        let mut script = Compiler::new().compile("int a = 1\n\nthrow \"boom\"").unwrap();
        let err = script.execute().unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.kind, ExecErrorKind::Thrown("boom".into()));
    }
}
