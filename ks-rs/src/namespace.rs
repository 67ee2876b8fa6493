//! A script's view of the registry: imported libraries plus interned types.
//!
//! Every distinct type (a prototype plus its optional element type) is
//! interned once into a [`TypeId`].  `List<int>` looked up twice yields the
//! same id; `List<int>` and `List<string>` are independent entries sharing
//! one prototype.  Base types are resolved eagerly while interning, so
//! subtype checks at run time need only a shared borrow.
//!
//! Name lookups from script text go through [`Namespace::resolve`], which
//! only sees libraries the script has imported.  Signatures written inside a
//! library use [`Namespace::resolve_in`], which sees every registered type
//! and substitutes `T` with the owner's element type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::Registry;
use crate::term::Value;
use crate::types::{GlobalDef, KeywordFn, Kind, LibId, NativeFunction, ProtoId, TypeDef, TypeId};

/// Prototypes of the system collection types.
pub const ENUMERABLE_PROTO: ProtoId = ProtoId(8);
pub const LIST_PROTO: ProtoId = ProtoId(9);
pub const ARRAY_PROTO: ProtoId = ProtoId(10);

/// How a value of one type may be stored into a binding of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Assignability {
    Exact,
    Subtype,
    Implicit,
    Never,
}

#[derive(Debug, Clone)]
struct TypeEntry {
    proto: ProtoId,
    param: Option<TypeId>,
    base: Option<TypeId>,
    name: String,
}

#[derive(Debug, Clone)]
pub struct Namespace {
    registry: Arc<Registry>,
    imported: Vec<bool>,
    entries: Vec<TypeEntry>,
    interned: HashMap<(ProtoId, Option<TypeId>), TypeId>,
}

impl Namespace {
    pub fn new(registry: Arc<Registry>) -> Self {
        let mut imported = vec![false; registry.library_count()];
        imported[LibId::SYSTEM.index()] = true;
        let mut ns = Self {
            registry,
            imported,
            entries: Vec::new(),
            interned: HashMap::new(),
        };
        let reg = Arc::clone(&ns.registry);
        for i in 0..reg.type_count() {
            let proto = ProtoId(i as u32);
            if !reg.type_def(proto).generic {
                ns.intern(proto, None);
            }
        }
        ns
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ── Imports ───────────────────────────────────────────────────────────────

    /// Make library `name` visible.  Returns `None` if no such library is
    /// registered, `Some(false)` if it was already imported.
    pub fn import(&mut self, name: &str) -> Option<bool> {
        let id = self.registry.library_id(name)?;
        let was = std::mem::replace(&mut self.imported[id.index()], true);
        Some(!was)
    }

    pub fn is_imported(&self, id: LibId) -> bool {
        self.imported.get(id.index()).copied().unwrap_or(false)
    }

    fn proto_visible(&self, proto: ProtoId) -> bool {
        self.is_imported(self.registry.type_library(proto))
    }

    // ── Interning ─────────────────────────────────────────────────────────────

    pub fn intern(&mut self, proto: ProtoId, param: Option<TypeId>) -> TypeId {
        if let Some(&id) = self.interned.get(&(proto, param)) {
            return id;
        }
        let reg = Arc::clone(&self.registry);
        let def = reg.type_def(proto);
        let name = match param {
            Some(p) => format!("{}<{}>", def.name, self.name(p)),
            None => def.name.clone(),
        };
        let id = TypeId(self.entries.len() as u32);
        self.entries.push(TypeEntry {
            proto,
            param,
            base: None,
            name,
        });
        self.interned.insert((proto, param), id);

        let base = match &def.base {
            Some(b) => self.resolve_with(b, param, false),
            None if id == TypeId::OBJECT || def.kind == Kind::Void => None,
            None => Some(TypeId::OBJECT),
        };
        self.entries[id.index()].base = base;
        id
    }

    /// Resolve a type name written in script text.
    pub fn resolve(&mut self, name: &str) -> Option<TypeId> {
        self.resolve_with(name, None, true)
    }

    /// Resolve a type name written in a library signature.  `T` stands for
    /// `param`.
    pub fn resolve_in(&mut self, name: &str, param: Option<TypeId>) -> Option<TypeId> {
        self.resolve_with(name, param, false)
    }

    fn resolve_with(&mut self, name: &str, param: Option<TypeId>, visible: bool) -> Option<TypeId> {
        let name = name.trim();
        if name == "T" && !visible {
            return param;
        }
        let (outer, inner) = match name.find('<') {
            Some(open) => {
                let inner = name[open + 1..].strip_suffix('>')?;
                (name[..open].trim(), Some(inner))
            }
            None => (name, None),
        };
        let proto = self.registry.proto(outer)?;
        if visible && !self.proto_visible(proto) {
            return None;
        }
        let generic = self.registry.type_def(proto).generic;
        match inner {
            Some(inner) if generic => {
                let elem = self.resolve_with(inner, param, visible)?;
                Some(self.intern(proto, Some(elem)))
            }
            None if !generic => Some(self.intern(proto, None)),
            _ => None,
        }
    }

    pub fn list_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(LIST_PROTO, Some(elem))
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(ARRAY_PROTO, Some(elem))
    }

    /// `true` if `word` names a generic type (so a following `<` opens a
    /// type argument list rather than a comparison).
    pub fn is_generic_name(&self, word: &str) -> bool {
        self.registry
            .proto(word)
            .is_some_and(|p| self.registry.type_def(p).generic)
    }

    /// `true` if `word` names a type visible to the script.
    pub fn is_type_name(&self, word: &str) -> bool {
        let outer = word.split('<').next().unwrap_or(word).trim();
        self.registry
            .proto(outer)
            .is_some_and(|p| self.proto_visible(p))
    }

    // ── Type queries ──────────────────────────────────────────────────────────

    pub fn name(&self, ty: TypeId) -> &str {
        &self.entries[ty.index()].name
    }

    pub fn proto(&self, ty: TypeId) -> ProtoId {
        self.entries[ty.index()].proto
    }

    pub fn param(&self, ty: TypeId) -> Option<TypeId> {
        self.entries[ty.index()].param
    }

    pub fn base(&self, ty: TypeId) -> Option<TypeId> {
        self.entries[ty.index()].base
    }

    pub fn def(&self, ty: TypeId) -> &TypeDef {
        self.registry.type_def(self.proto(ty))
    }

    pub fn kind(&self, ty: TypeId) -> Kind {
        self.def(ty).kind
    }

    /// `ty` followed by its base types, ending at `object`.
    pub fn chain(&self, ty: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut cur = Some(ty);
        while let Some(t) = cur {
            if out.contains(&t) {
                break;
            }
            out.push(t);
            cur = self.base(t);
        }
        out
    }

    pub fn is_subclass_of(&self, ty: TypeId, ancestor: TypeId) -> bool {
        if ancestor == TypeId::OBJECT {
            return ty != TypeId::VOID;
        }
        self.chain(ty).contains(&ancestor)
    }

    pub fn can_implicit_cast(&self, from: TypeId, to: TypeId) -> bool {
        let target = self.name(to);
        self.def(from).implicit_casts.iter().any(|n| n == target)
    }

    pub fn assignability(&self, from: TypeId, to: TypeId) -> Assignability {
        if from == to {
            Assignability::Exact
        } else if self.is_subclass_of(from, to) {
            Assignability::Subtype
        } else if self.can_implicit_cast(from, to) {
            Assignability::Implicit
        } else {
            Assignability::Never
        }
    }

    pub fn accepts(&self, declared: TypeId, from: TypeId) -> bool {
        self.assignability(from, declared) != Assignability::Never
    }

    /// Element type of an enumerable type, if `ty` is one.
    pub fn enumerable_elem(&self, ty: TypeId) -> Option<TypeId> {
        self.chain(ty)
            .into_iter()
            .find(|t| self.proto(*t) == ENUMERABLE_PROTO)
            .and_then(|t| self.param(t))
    }

    pub fn is_by_value(&self, ty: TypeId) -> bool {
        self.def(ty).by_value
    }

    /// The value a declaration without an initialiser starts with.
    pub fn default_value(&self, ty: TypeId) -> Value {
        let def = self.def(ty);
        match def.kind {
            Kind::Object | Kind::Void => Value::Null,
            Kind::Bool => Value::Bool(false),
            Kind::Int => Value::Int(0),
            Kind::UInt => Value::UInt(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Str => Value::Str(String::new()),
            Kind::List if def.is_abstract => Value::Null,
            Kind::List => Value::new_list(ty, Vec::new()),
            Kind::Host => match &def.default {
                Some(make) => Value::from_box(ty, make()),
                None => Value::Null,
            },
        }
    }

    // ── Library members ───────────────────────────────────────────────────────

    pub fn functions(&self, name: &str) -> Option<Vec<NativeFunction>> {
        match self.registry.functions(name) {
            Some((lib, fs)) if self.is_imported(lib) => Some(fs.to_vec()),
            _ => None,
        }
    }

    pub fn keyword(&self, name: &str) -> Option<KeywordFn> {
        match self.registry.keyword(name) {
            Some((lib, k)) if self.is_imported(lib) => Some(Arc::clone(k)),
            _ => None,
        }
    }

    pub fn global(&self, name: &str) -> Option<GlobalDef> {
        match self.registry.global(name) {
            Some((lib, g)) if self.is_imported(lib) => Some(g.clone()),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Library;
    use crate::types::{Signature, TypeDef};

    fn ns() -> Namespace {
        Namespace::new(Arc::new(Registry::new()))
    }

    #[test]
    fn primitives_have_fixed_ids() {
        let mut ns = ns();
        assert_eq!(ns.resolve("object"), Some(TypeId::OBJECT));
        assert_eq!(ns.resolve("int"), Some(TypeId::INT));
        assert_eq!(ns.resolve("string"), Some(TypeId::STRING));
        assert_eq!(ns.name(TypeId::DOUBLE), "double");
    }

    #[test]
    fn parameterised_types_are_interned_independently() {
        let mut ns = ns();
        let a = ns.resolve("List<int>").unwrap();
        let b = ns.resolve("List<int>").unwrap();
        let c = ns.resolve("List<string>").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ns.name(c), "List<string>");
        assert_eq!(ns.param(a), Some(TypeId::INT));
        assert_eq!(ns.proto(a), ns.proto(c));
    }

    #[test]
    fn nested_generics() {
        let mut ns = ns();
        let t = ns.resolve("List<List<int>>").unwrap();
        assert_eq!(ns.name(t), "List<List<int>>");
        let inner = ns.param(t).unwrap();
        assert_eq!(ns.param(inner), Some(TypeId::INT));
    }

    #[test]
    fn generic_requires_argument() {
        let mut ns = ns();
        assert_eq!(ns.resolve("List"), None);
        assert_eq!(ns.resolve("int<int>"), None);
        assert_eq!(ns.resolve("T"), None);
    }

    #[test]
    fn base_chain_substitutes_parameter() {
        let mut ns = ns();
        let list = ns.resolve("List<int>").unwrap();
        let en = ns.resolve("Enumerable<int>").unwrap();
        assert!(ns.is_subclass_of(list, en));
        assert!(ns.is_subclass_of(list, TypeId::OBJECT));
        assert!(!ns.is_subclass_of(en, list));
        assert_eq!(ns.enumerable_elem(list), Some(TypeId::INT));
        let other = ns.resolve("Enumerable<string>").unwrap();
        assert!(!ns.is_subclass_of(list, other));
    }

    #[test]
    fn implicit_casts() {
        let ns = ns();
        assert!(ns.can_implicit_cast(TypeId::INT, TypeId::DOUBLE));
        assert!(ns.can_implicit_cast(TypeId::DOUBLE, TypeId::BOOL));
        assert!(!ns.can_implicit_cast(TypeId::STRING, TypeId::BOOL));
        assert_eq!(ns.assignability(TypeId::INT, TypeId::INT), Assignability::Exact);
        assert_eq!(ns.assignability(TypeId::INT, TypeId::OBJECT), Assignability::Subtype);
        assert_eq!(ns.assignability(TypeId::INT, TypeId::FLOAT), Assignability::Implicit);
        assert_eq!(ns.assignability(TypeId::STRING, TypeId::INT), Assignability::Never);
    }

    #[test]
    fn library_types_need_import() {
        let mut lib = Library::new("geo");
        lib.add_type(TypeDef::new("point", Kind::Host));
        lib.function("origin", Signature::new("point", &[]), |_, _| Ok(Value::Null));
        let reg = Arc::new(Registry::with_libraries([lib]).unwrap());
        let mut ns = Namespace::new(reg);

        assert_eq!(ns.resolve("point"), None);
        assert!(ns.functions("origin").is_none());
        assert!(ns.resolve_in("point", None).is_some());

        assert_eq!(ns.import("geo"), Some(true));
        assert_eq!(ns.import("geo"), Some(false));
        assert_eq!(ns.import("nope"), None);
        assert!(ns.resolve("point").is_some());
        assert!(ns.functions("origin").is_some());
    }

    #[test]
    fn defaults() {
        let mut ns = ns();
        assert_eq!(ns.default_value(TypeId::INT), Value::Int(0));
        assert_eq!(ns.default_value(TypeId::STRING), Value::Str(String::new()));
        let list = ns.resolve("List<int>").unwrap();
        assert_eq!(ns.default_value(list).len(), Some(0));
        let en = ns.resolve("Enumerable<int>").unwrap();
        assert_eq!(ns.default_value(en), Value::Null);
    }

    #[test]
    fn generic_names() {
        let ns = ns();
        assert!(ns.is_generic_name("List"));
        assert!(!ns.is_generic_name("int"));
        assert!(!ns.is_generic_name("x"));
    }
}
