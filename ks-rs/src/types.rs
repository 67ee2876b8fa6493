//! Type descriptors and the native-code signatures libraries plug in.
//!
//! A [`TypeDef`] is the registry's description of one type: its kind, base
//! type, casts, operator allow-lists, fields, methods, constructors and index
//! operator.  Generic types (`List<T>`) are described once; the letter `T`
//! inside their member signatures stands for the bound element type.
//!
//! All native closures are `Send + Sync` so that a finished
//! [`Registry`](crate::registry::Registry) can be shared between scripts.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::compiler::Compiler;
use crate::error::{CompileError, ExecErrorKind};
use crate::exec::{CallCtx, Node};
use crate::term::Value;

// ── Identifiers ───────────────────────────────────────────────────────────────

/// An interned type: one prototype plus its (optional) bound element type.
///
/// Ids are only meaningful inside the [`Namespace`](crate::namespace::Namespace)
/// that issued them.  The system primitives have fixed ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const VOID: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const UINT: TypeId = TypeId(4);
    pub const FLOAT: TypeId = TypeId(5);
    pub const DOUBLE: TypeId = TypeId(6);
    pub const STRING: TypeId = TypeId(7);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// `true` for the four numeric primitives.
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeId::INT | TypeId::UINT | TypeId::FLOAT | TypeId::DOUBLE)
    }

    /// `true` for `bool`, the numerics and `string`.
    pub fn is_primitive(self) -> bool {
        self == TypeId::BOOL || self == TypeId::STRING || self.is_numeric()
    }
}

/// Index of a [`TypeDef`] in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtoId(pub u32);

impl ProtoId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a library in the registry.  The system library is always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibId(pub u32);

impl LibId {
    pub const SYSTEM: LibId = LibId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Kinds and operators ───────────────────────────────────────────────────────

/// Storage representation of a type's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The abstract root; holds any value.
    Object,
    Void,
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Str,
    /// A shared, growable sequence (`List<T>`, `Array<T>`).
    List,
    /// A host-defined payload.
    Host,
}

impl Kind {
    /// Whether bindings of this kind accept `null`.
    pub fn is_nullable(self) -> bool {
        matches!(self, Kind::Object | Kind::List | Kind::Host)
    }
}

/// The coarse category of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Null,
    Primitive,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
}

impl MathOp {
    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "+" => MathOp::Add,
            "-" => MathOp::Sub,
            "*" => MathOp::Mul,
            "/" => MathOp::Div,
            "%" => MathOp::Mod,
            "&" => MathOp::BitAnd,
            "|" => MathOp::BitOr,
            "^" => MathOp::BitXor,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Mod => "%",
            MathOp::BitAnd => "&",
            MathOp::BitOr => "|",
            MathOp::BitXor => "^",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, MathOp::BitAnd | MathOp::BitOr | MathOp::BitXor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    /// Map an ordering onto this operator's truth value.
    pub fn test(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
        }
    }
}

pub const ALL_MATH: &[MathOp] = &[
    MathOp::Add,
    MathOp::Sub,
    MathOp::Mul,
    MathOp::Div,
    MathOp::Mod,
    MathOp::BitAnd,
    MathOp::BitOr,
    MathOp::BitXor,
];

pub const ALL_COMPARE: &[CompareOp] = &[
    CompareOp::Eq,
    CompareOp::Ne,
    CompareOp::Lt,
    CompareOp::Le,
    CompareOp::Gt,
    CompareOp::Ge,
];

pub const EQUALITY: &[CompareOp] = &[CompareOp::Eq, CompareOp::Ne];

// ── Host payloads ─────────────────────────────────────────────────────────────

/// A host-defined value stored inside a script term.
///
/// Implemented automatically for any `Clone + PartialEq + Display` type.
pub trait HostValue: fmt::Display {
    fn clone_box(&self) -> Box<dyn HostValue>;
    fn eq_box(&self, other: &dyn HostValue) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> HostValue for T
where
    T: Any + Clone + PartialEq + fmt::Display,
{
    fn clone_box(&self) -> Box<dyn HostValue> {
        Box::new(self.clone())
    }

    fn eq_box(&self, other: &dyn HostValue) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Native closures ───────────────────────────────────────────────────────────

pub type NativeFn =
    Arc<dyn Fn(&mut CallCtx<'_>, &[Value]) -> Result<Value, ExecErrorKind> + Send + Sync>;
pub type MethodFn =
    Arc<dyn Fn(&mut CallCtx<'_>, &Value, &[Value]) -> Result<Value, ExecErrorKind> + Send + Sync>;
pub type GetterFn =
    Arc<dyn Fn(&mut CallCtx<'_>, &Value) -> Result<Value, ExecErrorKind> + Send + Sync>;
pub type SetterFn =
    Arc<dyn Fn(&mut CallCtx<'_>, &Value, Value) -> Result<(), ExecErrorKind> + Send + Sync>;
/// `(receiver, operand)`: index getters and binary operators.
pub type BinaryFn =
    Arc<dyn Fn(&mut CallCtx<'_>, &Value, &Value) -> Result<Value, ExecErrorKind> + Send + Sync>;
pub type IndexSetFn =
    Arc<dyn Fn(&mut CallCtx<'_>, &Value, &Value, Value) -> Result<(), ExecErrorKind> + Send + Sync>;
pub type InitFn = Arc<dyn Fn(&mut CallCtx<'_>) -> Result<Value, ExecErrorKind> + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn() -> Box<dyn HostValue> + Send + Sync>;
/// Compile-time keyword handler: receives the compiler and the text after
/// the keyword, may consume further lines, and optionally emits a node.
pub type KeywordFn =
    Arc<dyn Fn(&mut Compiler, &str) -> Result<Option<Node>, CompileError> + Send + Sync>;

// ── Signatures ────────────────────────────────────────────────────────────────

/// Declared parameter and return types, by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<String>,
    /// Element type of a trailing `params` parameter.
    pub rest: Option<String>,
    pub ret: String,
}

impl Signature {
    pub fn new(ret: &str, params: &[&str]) -> Self {
        Self {
            params: params.iter().map(|p| p.to_string()).collect(),
            rest: None,
            ret: ret.to_string(),
        }
    }

    /// Add a variadic tail collecting values of type `elem`.
    pub fn with_rest(mut self, elem: &str) -> Self {
        self.rest = Some(elem.to_string());
        self
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        for p in &self.params {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{p}")?;
        }
        if let Some(rest) = &self.rest {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "params {rest}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

// ── Members ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub sig: Signature,
    pub func: NativeFn,
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: String,
    pub get: GetterFn,
    pub set: Option<SetterFn>,
}

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub sig: Signature,
    pub func: MethodFn,
}

#[derive(Clone)]
pub struct ConstructorDef {
    pub sig: Signature,
    pub func: NativeFn,
}

#[derive(Clone)]
pub struct IndexDef {
    pub index: String,
    pub elem: String,
    pub get: BinaryFn,
    pub set: Option<IndexSetFn>,
}

/// A binary operator on a host type: `self op rhs -> ret`.
#[derive(Clone)]
pub struct OperatorDef {
    pub op: MathOp,
    pub rhs: String,
    pub ret: String,
    pub func: BinaryFn,
}

#[derive(Clone)]
pub struct GlobalDef {
    pub name: String,
    pub ty: String,
    pub init: InitFn,
}

#[derive(Clone)]
pub struct KeywordDef {
    pub name: String,
    pub handler: KeywordFn,
}

// ── TypeDef ───────────────────────────────────────────────────────────────────

/// Descriptor of one (possibly generic) type.
#[derive(Clone)]
pub struct TypeDef {
    pub name: String,
    pub kind: Kind,
    /// Base type name; may mention `T` (`Enumerable<T>`).  `None` means
    /// `object`.
    pub base: Option<String>,
    pub is_abstract: bool,
    pub generic: bool,
    /// Assignment copies the payload instead of sharing it.
    pub by_value: bool,
    pub implicit_casts: Vec<String>,
    pub math_ops: Vec<MathOp>,
    pub compare_ops: Vec<CompareOp>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub constructors: Vec<ConstructorDef>,
    pub static_fields: Vec<NativeFunction>,
    pub static_methods: Vec<NativeFunction>,
    pub operators: Vec<OperatorDef>,
    pub index: Option<IndexDef>,
    pub default: Option<DefaultFn>,
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base", &self.base)
            .field("is_abstract", &self.is_abstract)
            .field("generic", &self.generic)
            .finish_non_exhaustive()
    }
}

impl TypeDef {
    pub fn new(name: &str, kind: Kind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base: None,
            is_abstract: false,
            generic: false,
            by_value: false,
            implicit_casts: Vec::new(),
            math_ops: Vec::new(),
            compare_ops: EQUALITY.to_vec(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            static_fields: Vec::new(),
            static_methods: Vec::new(),
            operators: Vec::new(),
            index: None,
            default: None,
        }
    }

    pub fn base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Mark the type as taking one element type parameter, named `T`.
    pub fn generic(mut self) -> Self {
        self.generic = true;
        self
    }

    pub fn by_value(mut self) -> Self {
        self.by_value = true;
        self
    }

    pub fn implicit_cast(mut self, to: &str) -> Self {
        self.implicit_casts.push(to.to_string());
        self
    }

    pub fn math(mut self, ops: &[MathOp]) -> Self {
        self.math_ops = ops.to_vec();
        self
    }

    pub fn compare(mut self, ops: &[CompareOp]) -> Self {
        self.compare_ops = ops.to_vec();
        self
    }

    pub fn field<G>(mut self, name: &str, ty: &str, get: G) -> Self
    where
        G: Fn(&mut CallCtx<'_>, &Value) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
    {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty: ty.to_string(),
            get: Arc::new(get),
            set: None,
        });
        self
    }

    pub fn field_mut<G, S>(mut self, name: &str, ty: &str, get: G, set: S) -> Self
    where
        G: Fn(&mut CallCtx<'_>, &Value) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
        S: Fn(&mut CallCtx<'_>, &Value, Value) -> Result<(), ExecErrorKind>
            + Send
            + Sync
            + 'static,
    {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty: ty.to_string(),
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        });
        self
    }

    pub fn method<F>(mut self, name: &str, sig: Signature, func: F) -> Self
    where
        F: Fn(&mut CallCtx<'_>, &Value, &[Value]) -> Result<Value, ExecErrorKind>
            + Send
            + Sync
            + 'static,
    {
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig,
            func: Arc::new(func),
        });
        self
    }

    pub fn constructor<F>(mut self, params: &[&str], func: F) -> Self
    where
        F: Fn(&mut CallCtx<'_>, &[Value]) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
    {
        let sig = Signature::new(&self.name, params);
        self.constructors.push(ConstructorDef {
            sig,
            func: Arc::new(func),
        });
        self
    }

    pub fn static_field<F>(mut self, name: &str, ty: &str, func: F) -> Self
    where
        F: Fn(&mut CallCtx<'_>, &[Value]) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
    {
        self.static_fields.push(NativeFunction {
            name: name.to_string(),
            sig: Signature::new(ty, &[]),
            func: Arc::new(func),
        });
        self
    }

    pub fn static_method<F>(mut self, name: &str, sig: Signature, func: F) -> Self
    where
        F: Fn(&mut CallCtx<'_>, &[Value]) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
    {
        self.static_methods.push(NativeFunction {
            name: name.to_string(),
            sig,
            func: Arc::new(func),
        });
        self
    }

    pub fn operator<F>(mut self, op: MathOp, rhs: &str, ret: &str, func: F) -> Self
    where
        F: Fn(&mut CallCtx<'_>, &Value, &Value) -> Result<Value, ExecErrorKind>
            + Send
            + Sync
            + 'static,
    {
        self.operators.push(OperatorDef {
            op,
            rhs: rhs.to_string(),
            ret: ret.to_string(),
            func: Arc::new(func),
        });
        self
    }

    pub fn index<G>(mut self, index: &str, elem: &str, get: G) -> Self
    where
        G: Fn(&mut CallCtx<'_>, &Value, &Value) -> Result<Value, ExecErrorKind>
            + Send
            + Sync
            + 'static,
    {
        self.index = Some(IndexDef {
            index: index.to_string(),
            elem: elem.to_string(),
            get: Arc::new(get),
            set: None,
        });
        self
    }

    pub fn index_mut<G, S>(mut self, index: &str, elem: &str, get: G, set: S) -> Self
    where
        G: Fn(&mut CallCtx<'_>, &Value, &Value) -> Result<Value, ExecErrorKind>
            + Send
            + Sync
            + 'static,
        S: Fn(&mut CallCtx<'_>, &Value, &Value, Value) -> Result<(), ExecErrorKind>
            + Send
            + Sync
            + 'static,
    {
        self.index = Some(IndexDef {
            index: index.to_string(),
            elem: elem.to_string(),
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        });
        self
    }

    /// Payload factory for declarations without an initialiser.
    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Box<dyn HostValue> + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(f));
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDef> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Every name this type exposes as a member, for diagnostics.
    pub fn member_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.methods.iter().map(|m| m.name.as_str()))
            .chain(self.static_fields.iter().map(|f| f.name.as_str()))
            .chain(self.static_methods.iter().map(|m| m.name.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Point(i32, i32);

    impl fmt::Display for Point {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "({}, {})", self.0, self.1)
        }
    }

    #[test]
    fn signature_display() {
        let sig = Signature::new("void", &["int"]).with_rest("int");
        assert_eq!(sig.to_string(), "(int, params int) -> void");
        assert_eq!(Signature::new("int", &[]).to_string(), "() -> int");
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in ALL_MATH {
            assert_eq!(MathOp::from_symbol(op.symbol()), Some(*op));
        }
        for op in ALL_COMPARE {
            assert_eq!(CompareOp::from_symbol(op.symbol()), Some(*op));
        }
    }

    #[test]
    fn compare_op_tests_ordering() {
        use std::cmp::Ordering::*;
        assert!(CompareOp::Le.test(Equal));
        assert!(CompareOp::Le.test(Less));
        assert!(!CompareOp::Gt.test(Equal));
        assert!(CompareOp::Ne.test(Greater));
    }

    #[test]
    fn host_value_blanket_impl() {
        let a: Box<dyn HostValue> = Box::new(Point(1, 2));
        let b = a.clone_box();
        assert!(a.eq_box(b.as_ref()));
        assert_eq!(b.to_string(), "(1, 2)");
        assert!(!a.eq_box(&Point(3, 4)));
        assert_eq!(b.as_any().downcast_ref::<Point>(), Some(&Point(1, 2)));
    }

    #[test]
    fn builder_collects_members() {
        let def = TypeDef::new("point", Kind::Host)
            .field("x", "int", |_, _| Ok(Value::Int(0)))
            .method("len", Signature::new("double", &[]), |_, _, _| Ok(Value::Double(0.0)))
            .constructor(&["int", "int"], |_, _| Ok(Value::Null));
        assert!(def.field_def("x").is_some());
        assert_eq!(def.methods_named("len").count(), 1);
        assert_eq!(def.constructors[0].sig.ret, "point");
        assert_eq!(def.member_names(), vec!["len", "x"]);
    }
}
