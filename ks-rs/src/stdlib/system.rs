//! The system library: primitive types, collections, `print`, `typeof` and
//! the control-flow keywords.
//!
//! Type registration order is significant.  The first eight types get the
//! fixed [`TypeId`](crate::types::TypeId)s, and the collection prototypes
//! must land on the ids in [`crate::namespace`].

use crate::error::ExecErrorKind;
use crate::registry::Library;
use crate::term::Value;
use crate::types::{CompareOp, Kind, MathOp, Signature, TypeDef, ALL_COMPARE, ALL_MATH, EQUALITY};

use super::{arg, arg_int, arg_str, index_in, keywords, recv_list, recv_str};

pub const NAME: &str = "system";

const FLOAT_MATH: &[MathOp] = &[MathOp::Add, MathOp::Sub, MathOp::Mul, MathOp::Div, MathOp::Mod];
const BOOL_MATH: &[MathOp] = &[MathOp::BitAnd, MathOp::BitOr, MathOp::BitXor];

pub fn library() -> Library {
    let mut lib = Library::new(NAME);
    for def in primitive_types() {
        lib.add_type(def);
    }
    lib.add_type(string_type());
    lib.add_type(enumerable_type());
    lib.add_type(list_type());
    lib.add_type(array_type());

    lib.function("print", Signature::new("void", &[]).with_rest("object"), |ctx, args| {
        let values = arg(args, 0)?.items().unwrap_or_default();
        let line: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        ctx.write(&line.join(" "));
        ctx.write("\n");
        Ok(Value::Null)
    });
    lib.function("typeof", Signature::new("string", &["object"]), |ctx, args| {
        Ok(Value::Str(ctx.type_name(arg(args, 0)?)))
    });

    keywords::register(&mut lib);
    lib
}

fn primitive_types() -> Vec<TypeDef> {
    vec![
        TypeDef::new("object", Kind::Object).abstract_type(),
        TypeDef::new("void", Kind::Void).abstract_type(),
        TypeDef::new("bool", Kind::Bool).math(BOOL_MATH).compare(EQUALITY),
        TypeDef::new("int", Kind::Int)
            .implicit_cast("uint")
            .implicit_cast("float")
            .implicit_cast("double")
            .implicit_cast("bool")
            .math(ALL_MATH)
            .compare(ALL_COMPARE),
        TypeDef::new("uint", Kind::UInt)
            .implicit_cast("int")
            .implicit_cast("float")
            .implicit_cast("double")
            .implicit_cast("bool")
            .math(ALL_MATH)
            .compare(ALL_COMPARE),
        TypeDef::new("float", Kind::Float)
            .implicit_cast("double")
            .implicit_cast("bool")
            .math(FLOAT_MATH)
            .compare(ALL_COMPARE),
        TypeDef::new("double", Kind::Double)
            .implicit_cast("float")
            .implicit_cast("bool")
            .math(FLOAT_MATH)
            .compare(ALL_COMPARE),
    ]
}

// ── string ────────────────────────────────────────────────────────────────────

fn string_type() -> TypeDef {
    TypeDef::new("string", Kind::Str)
        .math(&[MathOp::Add])
        .compare(ALL_COMPARE)
        .field("length", "int", |_, recv| {
            Ok(Value::Int(recv_str(recv)?.chars().count() as i32))
        })
        .method("substring", Signature::new("string", &["int", "int"]), |_, recv, args| {
            let s = recv_str(recv)?;
            let len = s.chars().count();
            let start = arg_int(args, 0)?;
            let count = arg_int(args, 1)?;
            if start < 0 || start as usize > len {
                return Err(ExecErrorKind::IndexOutOfRange { index: start, len });
            }
            if count < 0 || start as usize + count as usize > len {
                return Err(ExecErrorKind::IndexOutOfRange { index: start + count, len });
            }
            Ok(Value::Str(s.chars().skip(start as usize).take(count as usize).collect()))
        })
        .method("toUpper", Signature::new("string", &[]), |_, recv, _| {
            Ok(Value::Str(recv_str(recv)?.to_uppercase()))
        })
        .method("toLower", Signature::new("string", &[]), |_, recv, _| {
            Ok(Value::Str(recv_str(recv)?.to_lowercase()))
        })
        .method("contains", Signature::new("bool", &["string"]), |_, recv, args| {
            Ok(Value::Bool(recv_str(recv)?.contains(arg_str(args, 0)?)))
        })
        .method("indexOf", Signature::new("int", &["string"]), |_, recv, args| {
            let s = recv_str(recv)?;
            let found = s
                .find(arg_str(args, 0)?)
                .map_or(-1, |byte| s[..byte].chars().count() as i32);
            Ok(Value::Int(found))
        })
        .method("split", Signature::new("List<string>", &["string"]), |ctx, recv, args| {
            let s = recv_str(recv)?;
            let sep = arg_str(args, 0)?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(sep).map(Value::from).collect()
            };
            Ok(ctx.list(parts))
        })
        .method("trim", Signature::new("string", &[]), |_, recv, _| {
            Ok(Value::Str(recv_str(recv)?.trim().to_string()))
        })
}

// ── Collections ───────────────────────────────────────────────────────────────

fn get_item(recv: &Value, index: &Value) -> Result<Value, ExecErrorKind> {
    let list = recv_list(recv)?;
    let items = list.items.borrow();
    let i = index_in(index.as_i64().unwrap_or(-1), items.len())?;
    Ok(items[i].clone())
}

fn set_item(recv: &Value, index: &Value, value: Value) -> Result<(), ExecErrorKind> {
    let list = recv_list(recv)?;
    let mut items = list.items.borrow_mut();
    let i = index_in(index.as_i64().unwrap_or(-1), items.len())?;
    items[i] = value;
    Ok(())
}

fn enumerable_type() -> TypeDef {
    TypeDef::new("Enumerable", Kind::List)
        .generic()
        .compare(EQUALITY)
        .abstract_type()
        .field("count", "int", |_, recv| {
            Ok(Value::Int(recv_list(recv)?.items.borrow().len() as i32))
        })
        .index("int", "T", |_, recv, index| get_item(recv, index))
        .method("contains", Signature::new("bool", &["T"]), |ctx, recv, args| {
            let needle = arg(args, 0)?;
            let list = recv_list(recv)?;
            let found = list.items.borrow().iter().any(|item| {
                Value::compare(CompareOp::Eq, item, needle, ctx.ns, ctx.epsilon).unwrap_or(false)
            });
            Ok(Value::Bool(found))
        })
}

fn list_type() -> TypeDef {
    TypeDef::new("List", Kind::List)
        .generic()
        .compare(EQUALITY)
        .base("Enumerable<T>")
        .constructor(&[], |ctx, _| Ok(ctx.list(Vec::new())))
        .index_mut(
            "int",
            "T",
            |_, recv, index| get_item(recv, index),
            |_, recv, index, value| set_item(recv, index, value),
        )
        .method("add", Signature::new("void", &["T"]), |_, recv, args| {
            recv_list(recv)?.items.borrow_mut().push(arg(args, 0)?.clone());
            Ok(Value::Null)
        })
        .method("insert", Signature::new("void", &["int", "T"]), |_, recv, args| {
            let list = recv_list(recv)?;
            let mut items = list.items.borrow_mut();
            let index = arg_int(args, 0)?;
            let i = index_in(index, items.len() + 1)?;
            items.insert(i, arg(args, 1)?.clone());
            Ok(Value::Null)
        })
        .method("removeAt", Signature::new("void", &["int"]), |_, recv, args| {
            let list = recv_list(recv)?;
            let mut items = list.items.borrow_mut();
            let i = index_in(arg_int(args, 0)?, items.len())?;
            items.remove(i);
            Ok(Value::Null)
        })
        .method("clear", Signature::new("void", &[]), |_, recv, _| {
            recv_list(recv)?.items.borrow_mut().clear();
            Ok(Value::Null)
        })
}

fn array_type() -> TypeDef {
    TypeDef::new("Array", Kind::List)
        .generic()
        .compare(EQUALITY)
        .base("Enumerable<T>")
        .constructor(&["int"], |ctx, args| {
            let size = arg_int(args, 0)?;
            let size = usize::try_from(size)
                .map_err(|_| ExecErrorKind::Native(format!("negative array size {size}")))?;
            let elem = ctx
                .ns
                .param(ctx.ret)
                .ok_or_else(|| ExecErrorKind::Native("array without element type".into()))?;
            let items = (0..size).map(|_| ctx.ns.default_value(elem)).collect();
            Ok(ctx.list(items))
        })
        .index_mut(
            "int",
            "T",
            |_, recv, index| get_item(recv, index),
            |_, recv, index, value| set_item(recv, index, value),
        )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::error::ExecErrorKind;
    use crate::term::Value;

    fn run(src: &str) -> String {
        let mut script = Compiler::new().compile(src).unwrap();
        script.execute().unwrap();
        script.take_output()
    }

    #[test]
    fn print_joins_with_spaces() {
        assert_eq!(run("print(1, \"a\", 2.5, true)"), "1 a 2.5 true\n");
        assert_eq!(run("print()"), "\n");
    }

    #[test]
    fn typeof_reports_runtime_type() {
        assert_eq!(run("object o = 5\nprint(typeof(o))"), "int\n");
        assert_eq!(run("print(typeof(new List<string>()))"), "List<string>\n");
        assert_eq!(run("object o\nprint(typeof(o))"), "null\n");
    }

    #[test]
    fn string_members() {
        let out = run(concat!(
            "string s = \"  Hello, World  \"\n",
            "string t = s.trim()\n",
            "print(t.length, t.toUpper(), t.substring(7, 5), t.indexOf(\"World\"), t.contains(\"lo,\"))\n",
        ));
        assert_eq!(out, "12 HELLO, WORLD World 7 true\n");
    }

    #[test]
    fn split_produces_list() {
        let out = run("List<string> parts = \"a,b,c\".split(\",\")\nprint(parts.count, parts[1])");
        assert_eq!(out, "3 b\n");
    }

    #[test]
    fn list_operations() {
        let out = run(concat!(
            "List<int> xs = new List<int>()\n",
            "xs.add(1)\n",
            "xs.add(3)\n",
            "xs.insert(1, 2)\n",
            "xs[0] = 10\n",
            "print(xs, xs.count, xs.contains(3))\n",
            "xs.removeAt(0)\n",
            "print(xs)\n",
            "xs.clear()\n",
            "print(xs.count)\n",
        ));
        assert_eq!(out, "[10, 2, 3] 3 true\n[2, 3]\n0\n");
    }

    #[test]
    fn array_is_filled_with_defaults() {
        assert_eq!(run("Array<int> a = new Array<int>(3)\na[2] = 7\nprint(a)"), "[0, 0, 7]\n");
        assert_eq!(run("Array<string> a = new Array<string>(2)\nprint(a.count)"), "2\n");
    }

    #[test]
    fn index_out_of_range_is_runtime_error() {
        let mut script = Compiler::new()
            .compile("List<int> xs = new List<int>()\nint x = xs[0]")
            .unwrap();
        let err = script.execute().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ExecErrorKind::IndexOutOfRange { index: 0, len: 0 });
    }

    #[test]
    fn enumerable_binding_accepts_list() {
        let mut script = Compiler::new()
            .compile("List<int> xs = new List<int>()\nxs.add(4)\nEnumerable<int> e = xs\nint n = e.count")
            .unwrap();
        script.execute().unwrap();
        assert_eq!(script.get_term("n"), Some(Value::Int(1)));
    }
}
