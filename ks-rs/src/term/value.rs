//! Runtime values.
//!
//! Primitives are stored at their native width (`int` is `i32`, `float` is
//! `f32`).  Arithmetic on integers runs in `i64` and wraps to the result
//! width; arithmetic on floating types runs through `f64`.  Lists and host
//! objects are shared, interior-mutable cells: copying a [`Value`] copies the
//! reference, [`Value::deep_clone`] copies the contents.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::ExecErrorKind;
use crate::lexer::{self, LiteralShape};
use crate::namespace::Namespace;
use crate::types::{CompareOp, HostValue, Kind, MathOp, TermKind, TypeId};

/// Storage behind `List<T>` and `Array<T>` values.
pub struct ListObj {
    pub ty: TypeId,
    pub items: RefCell<Vec<Value>>,
}

/// Storage behind host-defined values.
pub struct HostObj {
    pub ty: TypeId,
    pub data: RefCell<Box<dyn HostValue>>,
}

impl fmt::Debug for ListObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListObj")
            .field("ty", &self.ty)
            .field("items", &self.items.borrow())
            .finish()
    }
}

impl fmt::Debug for HostObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObj({:?}, {})", self.ty, self.data.borrow())
    }
}

/// A script runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    Str(String),
    List(Rc<ListObj>),
    Object(Rc<HostObj>),
}

impl PartialEq for Value {
    /// Structural equality: lists compare element-wise, host objects by
    /// payload.  Script-level `==` is [`Value::compare`].
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || (a.ty == b.ty && *a.items.borrow() == *b.items.borrow())
            }
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || (a.ty == b.ty && a.data.borrow().eq_box(b.data.borrow().as_ref()))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::UInt(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Double(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Object(o) => write!(f, "{}", o.data.borrow()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl Value {
    // ── Construction ──────────────────────────────────────────────────────────

    pub fn new_list(ty: TypeId, items: Vec<Value>) -> Self {
        Value::List(Rc::new(ListObj {
            ty,
            items: RefCell::new(items),
        }))
    }

    pub fn host<T: HostValue + 'static>(ty: TypeId, data: T) -> Self {
        Self::from_box(ty, Box::new(data))
    }

    pub fn from_box(ty: TypeId, data: Box<dyn HostValue>) -> Self {
        Value::Object(Rc::new(HostObj {
            ty,
            data: RefCell::new(data),
        }))
    }

    /// Copy the value, including the contents of lists and host objects.
    pub fn deep_clone(&self) -> Self {
        match self {
            Value::List(l) => Value::new_list(
                l.ty,
                l.items.borrow().iter().map(Value::deep_clone).collect(),
            ),
            Value::Object(o) => Value::from_box(o.ty, o.data.borrow().clone_box()),
            v => v.clone(),
        }
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// The runtime type.  `null` reports `object`.
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Null => TypeId::OBJECT,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::UInt(_) => TypeId::UINT,
            Value::Float(_) => TypeId::FLOAT,
            Value::Double(_) => TypeId::DOUBLE,
            Value::Str(_) => TypeId::STRING,
            Value::List(l) => l.ty,
            Value::Object(o) => o.ty,
        }
    }

    pub fn term_kind(&self) -> TermKind {
        match self {
            Value::Null => TermKind::Null,
            Value::List(_) | Value::Object(_) => TermKind::Composite,
            _ => TermKind::Primitive,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of an integral value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n as i64),
            Value::UInt(n) => Some(*n as i64),
            _ => None,
        }
    }

    /// Floating view of any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<ListObj>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Number of items, for lists.
    pub fn len(&self) -> Option<usize> {
        self.as_list().map(|l| l.items.borrow().len())
    }

    /// Snapshot of a list's items.
    pub fn items(&self) -> Option<Vec<Value>> {
        self.as_list().map(|l| l.items.borrow().clone())
    }

    /// Borrow a host payload as `T`.
    pub fn with_host<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match self {
            Value::Object(o) => {
                let data = o.data.borrow();
                data.as_any().downcast_ref::<T>().map(f)
            }
            _ => None,
        }
    }

    /// Mutably borrow a host payload as `T`.
    pub fn with_host_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self {
            Value::Object(o) => {
                let mut data = o.data.borrow_mut();
                data.as_any_mut().downcast_mut::<T>().map(f)
            }
            _ => None,
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────────

    /// Parse literal syntax (`true`, `-12`, `7u`, `3.5`, `2.5f`, `"a\tb"`,
    /// `null`).
    pub fn parse_literal(text: &str) -> Option<Value> {
        Some(match lexer::literal_shape(text)? {
            LiteralShape::Null => Value::Null,
            LiteralShape::Bool => Value::Bool(text == "true"),
            LiteralShape::Int => Value::Int(text.parse().ok()?),
            LiteralShape::UInt => Value::UInt(text.strip_suffix('u')?.parse().ok()?),
            LiteralShape::Float => Value::Float(text.strip_suffix('f')?.parse().ok()?),
            LiteralShape::Double => Value::Double(text.parse().ok()?),
            LiteralShape::Str => Value::Str(lexer::unescape(text)?),
        })
    }

    /// Render as literal syntax that [`Value::parse_literal`] reads back.
    /// `None` for values with no literal form.
    pub fn to_literal(&self) -> Option<String> {
        fn floating(s: String) -> Option<String> {
            if s.contains("inf") || s.contains("NaN") {
                None
            } else if s.contains('.') {
                Some(s)
            } else {
                Some(s + ".0")
            }
        }
        match self {
            Value::Null => Some("null".into()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::UInt(n) => Some(format!("{n}u")),
            Value::Float(x) => floating(x.to_string()).map(|s| s + "f"),
            Value::Double(x) => floating(x.to_string()),
            Value::Str(s) => Some(lexer::escape(s)),
            Value::List(_) | Value::Object(_) => None,
        }
    }

    // ── Casting ───────────────────────────────────────────────────────────────

    /// Convert to `target`, failing with `InvalidCast` when no conversion
    /// exists or a string does not parse.
    pub fn cast_to(&self, target: TypeId, ns: &Namespace) -> Result<Value, ExecErrorKind> {
        let kind = ns.kind(target);
        let fail = || ExecErrorKind::InvalidCast {
            from: if self.is_null() {
                "null".to_string()
            } else {
                ns.name(self.type_id()).to_string()
            },
            to: ns.name(target).to_string(),
        };

        match (kind, self) {
            (k, Value::Null) => {
                if k.is_nullable() {
                    Ok(Value::Null)
                } else {
                    Err(fail())
                }
            }
            (Kind::Object, v) => Ok(v.clone()),
            (Kind::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (Kind::Bool, Value::Str(s)) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            (Kind::Bool, v) => v.as_f64().map(|x| Value::Bool(x >= 1.0)).ok_or_else(fail),
            (Kind::Str, v) => Ok(Value::Str(v.to_string())),
            (k @ (Kind::Int | Kind::UInt | Kind::Float | Kind::Double), v) => match v {
                Value::Bool(b) => Ok(from_i64(k, *b as i64)),
                Value::Int(_) | Value::UInt(_) => Ok(from_i64(k, v.as_i64().unwrap_or(0))),
                Value::Float(_) | Value::Double(_) => Ok(from_f64(k, v.as_f64().unwrap_or(0.0))),
                Value::Str(s) => parse_number(s, k).ok_or_else(fail),
                _ => Err(fail()),
            },
            (Kind::List | Kind::Host, v) if ns.is_subclass_of(v.type_id(), target) => Ok(v.clone()),
            _ => Err(fail()),
        }
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    /// Apply a primitive math operator.  `result` is the statically chosen
    /// result type; operands are widened to it.
    pub fn math(
        op: MathOp,
        lhs: &Value,
        rhs: &Value,
        result: TypeId,
        ns: &Namespace,
    ) -> Result<Value, ExecErrorKind> {
        let kind = ns.kind(result);
        let unsupported = || ExecErrorKind::UnsupportedOperator {
            op: op.symbol().to_string(),
            ty: ns.name(result).to_string(),
        };

        match kind {
            Kind::Str if op == MathOp::Add => Ok(Value::Str(format!("{lhs}{rhs}"))),
            Kind::Bool => {
                let (a, b) = (lhs.as_bool().ok_or_else(unsupported)?, rhs.as_bool().ok_or_else(unsupported)?);
                match op {
                    MathOp::BitAnd => Ok(Value::Bool(a & b)),
                    MathOp::BitOr => Ok(Value::Bool(a | b)),
                    MathOp::BitXor => Ok(Value::Bool(a ^ b)),
                    _ => Err(unsupported()),
                }
            }
            Kind::Int | Kind::UInt => {
                let a = int_operand(lhs).ok_or_else(unsupported)?;
                let b = int_operand(rhs).ok_or_else(unsupported)?;
                let n = match op {
                    MathOp::Add => a.wrapping_add(b),
                    MathOp::Sub => a.wrapping_sub(b),
                    MathOp::Mul => a.wrapping_mul(b),
                    MathOp::Div if b == 0 => return Err(ExecErrorKind::DivisionByZero),
                    MathOp::Div => a.wrapping_div(b),
                    MathOp::Mod if b == 0 => return Err(ExecErrorKind::DivisionByZero),
                    MathOp::Mod => a.wrapping_rem(b),
                    MathOp::BitAnd => a & b,
                    MathOp::BitOr => a | b,
                    MathOp::BitXor => a ^ b,
                };
                Ok(from_i64(kind, n))
            }
            Kind::Float | Kind::Double => {
                let a = lhs.as_f64().ok_or_else(unsupported)?;
                let b = rhs.as_f64().ok_or_else(unsupported)?;
                let x = match op {
                    MathOp::Add => a + b,
                    MathOp::Sub => a - b,
                    MathOp::Mul => a * b,
                    MathOp::Div => a / b,
                    MathOp::Mod => a % b,
                    _ => return Err(unsupported()),
                };
                Ok(from_f64(kind, x))
            }
            _ => Err(unsupported()),
        }
    }

    /// Apply a comparison.  Floating values within `epsilon` of each other
    /// are equal; lists compare by identity; host objects by payload.
    pub fn compare(
        op: CompareOp,
        lhs: &Value,
        rhs: &Value,
        ns: &Namespace,
        epsilon: f64,
    ) -> Result<bool, ExecErrorKind> {
        let unsupported = || ExecErrorKind::UnsupportedOperator {
            op: op.symbol().to_string(),
            ty: ns.name(lhs.type_id()).to_string(),
        };

        let ord = match (lhs, rhs) {
            (Value::Null, Value::Null) if op.is_equality() => Ordering::Equal,
            (Value::Null, _) | (_, Value::Null) if op.is_equality() => Ordering::Less,
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) if op.is_equality() => a.cmp(b),
            (Value::List(a), Value::List(b)) if op.is_equality() => {
                if Rc::ptr_eq(a, b) {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            }
            (Value::Object(a), Value::Object(b)) if op.is_equality() => {
                if Rc::ptr_eq(a, b) || a.data.borrow().eq_box(b.data.borrow().as_ref()) {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = a.as_f64().ok_or_else(unsupported)?;
                    let y = b.as_f64().ok_or_else(unsupported)?;
                    if (x - y).abs() < epsilon {
                        Ordering::Equal
                    } else {
                        match x.partial_cmp(&y) {
                            Some(o) => o,
                            None => return Ok(op == CompareOp::Ne),
                        }
                    }
                }
            },
        };
        Ok(op.test(ord))
    }

    pub fn negate(&self, ns: &Namespace) -> Result<Value, ExecErrorKind> {
        match self {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::UInt(n) => Ok(Value::Int((*n as i64).wrapping_neg() as i32)),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Double(x) => Ok(Value::Double(-x)),
            v => Err(ExecErrorKind::UnsupportedOperator {
                op: "-".into(),
                ty: ns.name(v.type_id()).to_string(),
            }),
        }
    }
}

// ── Numeric helpers ───────────────────────────────────────────────────────────

fn int_operand(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|x| x as i64))
}

fn from_i64(kind: Kind, n: i64) -> Value {
    match kind {
        Kind::UInt => Value::UInt(n as u32),
        Kind::Float => Value::Float(n as f32),
        Kind::Double => Value::Double(n as f64),
        _ => Value::Int(n as i32),
    }
}

fn from_f64(kind: Kind, x: f64) -> Value {
    match kind {
        Kind::Int => Value::Int(x as i32),
        Kind::UInt => Value::UInt(x as u32),
        Kind::Float => Value::Float(x as f32),
        _ => Value::Double(x),
    }
}

/// Parse a numeric string for a cast.  Strings without a decimal point or
/// exponent go through the integer path even for floating targets.
fn parse_number(s: &str, kind: Kind) -> Option<Value> {
    let s = s.trim();
    match kind {
        Kind::Int => s.parse::<i32>().ok().map(Value::Int),
        Kind::UInt => s.parse::<u32>().ok().map(Value::UInt),
        Kind::Float | Kind::Double => {
            let x = if s.contains(|c| matches!(c, '.' | 'e' | 'E')) {
                s.parse::<f64>().ok()?
            } else {
                match s.parse::<i64>() {
                    Ok(n) => n as f64,
                    Err(_) => s.parse::<f64>().ok()?,
                }
            };
            Some(from_f64(kind, x))
        }
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
