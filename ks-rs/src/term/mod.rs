//! Terms: typed storage cells and the bindings that name them.

pub mod value;

pub use value::{HostObj, ListObj, Value};

use crate::error::ExecErrorKind;
use crate::namespace::Namespace;
use crate::types::TypeId;

/// Where a binding's term lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRef {
    /// Script or function storage; reset between executions.
    Local(usize),
    /// A library singleton; never reset.
    Global(usize),
}

/// A name bound to one term and the type it was declared with.
#[derive(Debug, Clone, PartialEq)]
pub struct Holder {
    pub name: String,
    pub slot: SlotRef,
    pub ty: TypeId,
}

/// A typed, mutable value cell.
///
/// The declared type may be wider than the type of the stored value
/// (`object o = 5`).  Every write goes through [`coerce`], so the two always
/// agree.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub ty: TypeId,
    pub value: Value,
}

impl Term {
    pub fn new(ty: TypeId, value: Value) -> Self {
        Self { ty, value }
    }

    /// A term holding `ty`'s default value.
    pub fn with_default(ns: &Namespace, ty: TypeId) -> Self {
        Self::new(ty, ns.default_value(ty))
    }

    pub fn get_value(&self) -> &Value {
        &self.value
    }

    /// Store `value`, converting it if the declared type allows.
    pub fn assign(&mut self, ns: &Namespace, value: Value) -> Result<(), ExecErrorKind> {
        self.value = copy_by_value(ns, coerce(ns, value, self.ty)?);
        Ok(())
    }

    /// Store a raw value of exactly the declared type.  Returns `false` and
    /// leaves the term unchanged otherwise.
    pub fn set_value(&mut self, ns: &Namespace, value: Value) -> bool {
        let ok = value.type_id() == self.ty || (value.is_null() && ns.kind(self.ty).is_nullable());
        if ok {
            self.value = value;
        }
        ok
    }

    /// Copy another term's value using assignment rules.
    pub fn copy_from(&mut self, ns: &Namespace, other: &Term) -> bool {
        self.assign(ns, other.value.clone()).is_ok()
    }

    /// Parse literal syntax into the term.
    pub fn parse(&mut self, ns: &Namespace, text: &str) -> bool {
        match Value::parse_literal(text.trim()) {
            Some(v) => self.assign(ns, v).is_ok(),
            None => false,
        }
    }
}

/// Convert `value` for storage in a binding declared as `declared`.
///
/// Accepts the same type, a subtype, or a type with an implicit cast to
/// `declared`; `null` is accepted by object, list and host bindings.
pub fn coerce(ns: &Namespace, value: Value, declared: TypeId) -> Result<Value, ExecErrorKind> {
    if value.is_null() {
        return if ns.kind(declared).is_nullable() {
            Ok(value)
        } else {
            Err(ExecErrorKind::InvalidAssignment {
                declared: ns.name(declared).to_string(),
                source: "null".to_string(),
            })
        };
    }
    let actual = value.type_id();
    if actual == declared || ns.is_subclass_of(actual, declared) {
        Ok(value)
    } else if ns.can_implicit_cast(actual, declared) {
        value.cast_to(declared, ns)
    } else {
        Err(ExecErrorKind::InvalidAssignment {
            declared: ns.name(declared).to_string(),
            source: ns.name(actual).to_string(),
        })
    }
}

/// Detach a host object whose type has value semantics (`vec3`) from every
/// other holder.  Other values are returned unchanged.
pub fn copy_by_value(ns: &Namespace, value: Value) -> Value {
    match &value {
        Value::Object(o) if ns.is_by_value(o.ty) => value.deep_clone(),
        _ => value,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn ns() -> Namespace {
        Namespace::new(Arc::new(Registry::new()))
    }

    #[test]
    fn bool_accepts_numeric() {
        let ns = ns();
        let mut t = Term::with_default(&ns, TypeId::BOOL);
        assert!(t.copy_from(&ns, &Term::new(TypeId::INT, Value::Int(1))));
        assert_eq!(t.value, Value::Bool(true));
        assert!(t.copy_from(&ns, &Term::new(TypeId::DOUBLE, Value::Double(0.2))));
        assert_eq!(t.value, Value::Bool(false));
    }

    #[test]
    fn string_rejected_by_bool() {
        let ns = ns();
        let mut t = Term::with_default(&ns, TypeId::BOOL);
        let err = t.assign(&ns, Value::from("hello")).unwrap_err();
        assert_eq!(
            err,
            ExecErrorKind::InvalidAssignment {
                declared: "bool".into(),
                source: "string".into()
            }
        );
        assert_eq!(t.value, Value::Bool(false));
    }

    #[test]
    fn object_binding_keeps_runtime_type() {
        let ns = ns();
        let mut t = Term::with_default(&ns, TypeId::OBJECT);
        t.assign(&ns, Value::Int(5)).unwrap();
        assert_eq!(t.value.type_id(), TypeId::INT);
    }

    #[test]
    fn subtype_assignable_but_not_reverse() {
        let mut ns = ns();
        let list = ns.resolve("List<int>").unwrap();
        let en = ns.resolve("Enumerable<int>").unwrap();
        let mut wide = Term::with_default(&ns, en);
        assert!(wide.assign(&ns, Value::new_list(list, vec![])).is_ok());

        let mut narrow = Term::with_default(&ns, list);
        let fake_enumerable = Value::new_list(en, vec![]);
        assert!(narrow.assign(&ns, fake_enumerable).is_err());
    }

    #[test]
    fn set_value_requires_exact_type() {
        let ns = ns();
        let mut t = Term::with_default(&ns, TypeId::INT);
        assert!(t.set_value(&ns, Value::Int(3)));
        assert!(!t.set_value(&ns, Value::Double(3.0)));
        assert_eq!(t.get_value(), &Value::Int(3));
    }

    #[test]
    fn parse_into_term() {
        let ns = ns();
        let mut t = Term::with_default(&ns, TypeId::DOUBLE);
        assert!(t.parse(&ns, "3.5"));
        assert_eq!(t.value, Value::Double(3.5));
        assert!(t.parse(&ns, "2"));
        assert_eq!(t.value, Value::Double(2.0));
        assert!(!t.parse(&ns, "\"x\""));
    }

    #[test]
    fn null_only_for_references() {
        let mut ns = ns();
        let list = ns.resolve("List<string>").unwrap();
        assert!(coerce(&ns, Value::Null, list).is_ok());
        assert!(coerce(&ns, Value::Null, TypeId::INT).is_err());
    }
}
