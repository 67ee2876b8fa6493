//! Call argument binding and overload resolution.

use crate::error::{CompileError, CompileErrorKind};
use crate::exec::nodes::{Args, RestArgs};
use crate::exec::Node;
use crate::lexer;
use crate::types::{Signature, TypeId};

use super::Compiler;

/// A signature with every type name resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSig {
    pub params: Vec<TypeId>,
    /// Element type of a trailing `params` parameter.
    pub rest: Option<TypeId>,
    pub ret: TypeId,
}

/// Static facts about one compiled argument.
#[derive(Clone, Copy)]
struct ArgInfo {
    ty: TypeId,
    null: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Pass {
    Exact,
    Assignable,
}

impl Compiler {
    /// Resolve a library signature; `T` stands for `param`.
    pub(crate) fn resolve_sig(
        &mut self,
        sig: &Signature,
        param: Option<TypeId>,
    ) -> Result<ResolvedSig, CompileError> {
        let ret = self.resolve_sig_name(&sig.ret, param)?;
        self.resolve_params(sig, param, ret)
    }

    /// Resolve the parameter types of `sig`, taking the return type as given.
    pub(crate) fn resolve_params(
        &mut self,
        sig: &Signature,
        param: Option<TypeId>,
        ret: TypeId,
    ) -> Result<ResolvedSig, CompileError> {
        let mut params = Vec::with_capacity(sig.params.len());
        for p in &sig.params {
            params.push(self.resolve_sig_name(p, param)?);
        }
        let rest = match &sig.rest {
            Some(r) => Some(self.resolve_sig_name(r, param)?),
            None => None,
        };
        Ok(ResolvedSig { params, rest, ret })
    }

    pub(crate) fn resolve_sig_name(&mut self, name: &str, param: Option<TypeId>) -> Result<TypeId, CompileError> {
        self.ns
            .resolve_in(name, param)
            .ok_or_else(|| self.error(CompileErrorKind::UnknownType(name.to_string())))
    }

    /// Compile a comma-separated argument list.
    pub(crate) fn compile_args(&mut self, text: &str) -> Result<Vec<Node>, CompileError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for part in lexer::split_top_level(text, ',', 0) {
            let part = part.trim();
            if part.is_empty() {
                return Err(self.error(CompileErrorKind::Syntax("empty argument".into())));
            }
            out.push(self.compile_expr(part)?);
        }
        Ok(out)
    }

    /// Pick the overload of `name` that accepts `args`.
    ///
    /// Signatures whose parameter types match exactly win over ones that
    /// need a subtype or implicit conversion; among equals the first
    /// registered wins.  Returns the chosen index and the bound arguments.
    pub(crate) fn bind_args(
        &mut self,
        name: &str,
        sigs: &[ResolvedSig],
        args: Vec<Node>,
    ) -> Result<(usize, Args), CompileError> {
        let info: Vec<ArgInfo> = args
            .iter()
            .map(|a| ArgInfo {
                ty: a.ty(),
                null: a.constant().is_some_and(|v| v.is_null()),
            })
            .collect();
        let arrays: Vec<Option<TypeId>> = sigs
            .iter()
            .map(|s| s.rest.map(|elem| self.ns.array_of(elem)))
            .collect();

        let chosen = [Pass::Exact, Pass::Assignable].into_iter().find_map(|pass| {
            sigs.iter()
                .zip(&arrays)
                .position(|(sig, array)| self.matches(sig, *array, &info, pass).is_some())
        });
        let Some(index) = chosen else {
            let shown: Vec<&str> = info
                .iter()
                .map(|a| if a.null { "null" } else { self.ns.name(a.ty) })
                .collect();
            return Err(self.error(CompileErrorKind::ArgumentMismatch {
                name: name.to_string(),
                args: shown.join(", "),
            }));
        };

        let sig = &sigs[index];
        let passthrough = self
            .matches(sig, arrays[index], &info, Pass::Assignable)
            .unwrap_or(false);
        let mut nodes = args.into_iter();
        let mut fixed = Vec::with_capacity(sig.params.len());
        for &ty in &sig.params {
            if let Some(node) = nodes.next() {
                fixed.push((node, ty));
            }
        }
        let rest = match (sig.rest, arrays[index]) {
            (Some(elem), Some(array_ty)) => Some(RestArgs {
                array_ty,
                elem,
                nodes: nodes.collect(),
                passthrough,
            }),
            _ => None,
        };
        Ok((index, Args { fixed, rest }))
    }

    /// `Some(passthrough)` if `sig` accepts `args` under `pass`.
    fn matches(
        &self,
        sig: &ResolvedSig,
        array: Option<TypeId>,
        args: &[ArgInfo],
        pass: Pass,
    ) -> Option<bool> {
        let fits = |param: TypeId, arg: &ArgInfo| {
            if arg.null {
                self.ns.kind(param).is_nullable()
            } else if arg.ty == TypeId::VOID {
                false
            } else {
                match pass {
                    Pass::Exact => arg.ty == param,
                    Pass::Assignable => self.ns.accepts(param, arg.ty),
                }
            }
        };

        let fixed = sig.params.len();
        match sig.rest {
            None if args.len() != fixed => return None,
            Some(_) if args.len() < fixed => return None,
            _ => {}
        }
        if !sig.params.iter().zip(args).all(|(&p, a)| fits(p, a)) {
            return None;
        }
        let (Some(elem), Some(array)) = (sig.rest, array) else {
            return Some(false);
        };
        let tail = &args[fixed..];
        if let [single] = tail {
            if !single.null && fits(array, single) {
                return Some(true);
            }
        }
        tail.iter().all(|a| fits(elem, a)).then_some(false)
    }
}
