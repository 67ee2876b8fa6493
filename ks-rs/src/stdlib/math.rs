//! The `math` library: numeric functions, the `PI` global and the `vec3`
//! host type.
//!
//! ```text
//! import math
//! vec3 v = new vec3(1.0, 2.0, 2.0)
//! double len = v.length()
//! vec3 w = v * 2.0 + vec3.zero
//! ```

use std::fmt;

use crate::error::ExecErrorKind;
use crate::exec::CallCtx;
use crate::registry::Library;
use crate::term::Value;
use crate::types::{Kind, MathOp, Signature, TypeDef, EQUALITY};

use super::{arg, arg_f64, arg_int};

pub const NAME: &str = "math";

/// A three-component vector, stored by value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, o: Vec3) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    pub fn cross(self, o: Vec3) -> Vec3 {
        Vec3::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len == 0.0 {
            self
        } else {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        }
    }

    pub fn scale(self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

fn vec3_of(v: &Value) -> Result<Vec3, ExecErrorKind> {
    v.with_host(|p: &Vec3| *p)
        .ok_or_else(|| ExecErrorKind::Native("expected a vec3".into()))
}

fn vec3_arg(args: &[Value], i: usize) -> Result<Vec3, ExecErrorKind> {
    vec3_of(arg(args, i)?)
}

type Getter = dyn Fn(&mut CallCtx<'_>, &Value) -> Result<Value, ExecErrorKind> + Send + Sync;
type Setter = dyn Fn(&mut CallCtx<'_>, &Value, Value) -> Result<(), ExecErrorKind> + Send + Sync;

fn component(pick: fn(&Vec3) -> f64) -> Box<Getter> {
    Box::new(move |_, recv| Ok(Value::Double(pick(&vec3_of(recv)?))))
}

fn set_component(put: fn(&mut Vec3, f64)) -> Box<Setter> {
    Box::new(move |_, recv, value| {
        let x = value
            .as_f64()
            .ok_or_else(|| ExecErrorKind::Native("expected a number".into()))?;
        recv.with_host_mut(|p: &mut Vec3| put(p, x))
            .ok_or_else(|| ExecErrorKind::Native("expected a vec3".into()))
    })
}

fn vec3_type() -> TypeDef {
    TypeDef::new("vec3", Kind::Host)
        .by_value()
        .compare(EQUALITY)
        .default_with(|| Box::new(Vec3::default()))
        .field_mut("x", "double", component(|v| v.x), set_component(|v, x| v.x = x))
        .field_mut("y", "double", component(|v| v.y), set_component(|v, y| v.y = y))
        .field_mut("z", "double", component(|v| v.z), set_component(|v, z| v.z = z))
        .constructor(&[], |ctx, _| Ok(ctx.host(Vec3::default())))
        .constructor(&["double", "double", "double"], |ctx, args| {
            Ok(ctx.host(Vec3::new(arg_f64(args, 0)?, arg_f64(args, 1)?, arg_f64(args, 2)?)))
        })
        .constructor(&["float", "float", "float"], |ctx, args| {
            Ok(ctx.host(Vec3::new(arg_f64(args, 0)?, arg_f64(args, 1)?, arg_f64(args, 2)?)))
        })
        .method("length", Signature::new("double", &[]), |_, recv, _| {
            Ok(Value::Double(vec3_of(recv)?.length()))
        })
        .method("normalized", Signature::new("vec3", &[]), |ctx, recv, _| {
            Ok(ctx.host(vec3_of(recv)?.normalized()))
        })
        .method("dot", Signature::new("double", &["vec3"]), |_, recv, args| {
            Ok(Value::Double(vec3_of(recv)?.dot(vec3_arg(args, 0)?)))
        })
        .static_field("zero", "vec3", |ctx, _| Ok(ctx.host(Vec3::default())))
        .static_method("cross", Signature::new("vec3", &["vec3", "vec3"]), |ctx, args| {
            Ok(ctx.host(vec3_arg(args, 0)?.cross(vec3_arg(args, 1)?)))
        })
        .operator(MathOp::Add, "vec3", "vec3", |ctx, l, r| {
            let (a, b) = (vec3_of(l)?, vec3_of(r)?);
            Ok(ctx.host(Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)))
        })
        .operator(MathOp::Sub, "vec3", "vec3", |ctx, l, r| {
            let (a, b) = (vec3_of(l)?, vec3_of(r)?);
            Ok(ctx.host(Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)))
        })
        .operator(MathOp::Mul, "double", "vec3", |ctx, l, r| {
            let k = r
                .as_f64()
                .ok_or_else(|| ExecErrorKind::Native("expected a number".into()))?;
            Ok(ctx.host(vec3_of(l)?.scale(k)))
        })
}

/// Register a one-argument `double -> double` function.
fn unary(lib: &mut Library, name: &str, f: fn(f64) -> f64) {
    lib.function(name, Signature::new("double", &["double"]), move |_, args| {
        Ok(Value::Double(f(arg_f64(args, 0)?)))
    });
}

pub fn library() -> Library {
    let mut lib = Library::new(NAME);
    lib.add_type(vec3_type());

    unary(&mut lib, "sqrt", f64::sqrt);
    unary(&mut lib, "sin", f64::sin);
    unary(&mut lib, "cos", f64::cos);
    unary(&mut lib, "floor", f64::floor);
    lib.function("abs", Signature::new("int", &["int"]), |_, args| {
        Ok(Value::Int((arg_int(args, 0)? as i32).wrapping_abs()))
    });
    unary(&mut lib, "abs", f64::abs);
    lib.function("min", Signature::new("int", &["int", "int"]), |_, args| {
        Ok(Value::Int(arg_int(args, 0)?.min(arg_int(args, 1)?) as i32))
    });
    lib.function("min", Signature::new("double", &["double", "double"]), |_, args| {
        Ok(Value::Double(arg_f64(args, 0)?.min(arg_f64(args, 1)?)))
    });
    lib.function("max", Signature::new("int", &["int", "int"]), |_, args| {
        Ok(Value::Int(arg_int(args, 0)?.max(arg_int(args, 1)?) as i32))
    });
    lib.function("max", Signature::new("double", &["double", "double"]), |_, args| {
        Ok(Value::Double(arg_f64(args, 0)?.max(arg_f64(args, 1)?)))
    });
    lib.function("pow", Signature::new("double", &["double", "double"]), |_, args| {
        Ok(Value::Double(arg_f64(args, 0)?.powf(arg_f64(args, 1)?)))
    });
    lib.global("PI", "double", |_| Ok(Value::Double(std::f64::consts::PI)));
    lib
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::error::CompileErrorKind;

    fn compiler() -> Compiler {
        Compiler::with_libraries([library()]).unwrap()
    }

    fn output(src: &str) -> String {
        let mut script = compiler().compile(src).unwrap();
        script.execute().unwrap();
        script.take_output()
    }

    #[test]
    fn vec3_arithmetic() {
        assert_eq!(Vec3::new(3.0, 4.0, 0.0).length(), 5.0);
        assert_eq!(Vec3::new(1.0, 0.0, 0.0).cross(Vec3::new(0.0, 1.0, 0.0)), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(Vec3::default().normalized(), Vec3::default());
    }

    #[test]
    fn requires_import() {
        let err = compiler().compile("double x = sqrt(4.0)").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::UnknownFunction("sqrt".into()));
        assert_eq!(output("import math\nprint(sqrt(16.0))"), "4\n");
    }

    #[test]
    fn overloads_pick_exact_match() {
        let out = output("import math\nprint(abs(-3), abs(-2.5), min(4, 9), max(1.5, 0.5))");
        assert_eq!(out, "3 2.5 4 1.5\n");
        assert_eq!(output("import math\nprint(typeof(abs(-3)))"), "int\n");
    }

    #[test]
    fn pi_global() {
        assert_eq!(output("import math\nprint(floor(PI * 100.0))"), "314\n");
    }

    #[test]
    fn vec3_in_scripts() {
        let src = concat!(
            "import math\n",
            "vec3 a = new vec3(1.0, 2.0, 2.0)\n",
            "vec3 b = a\n",
            "b.x = 10\n",
            "print(a, b.x, a.length())\n",
            "vec3 c = a * 2.0 + vec3.zero - new vec3()\n",
            "print(c, c == a * 2.0, c != a)\n",
            "print(vec3.cross(new vec3(1.0, 0.0, 0.0), new vec3(0.0, 1.0, 0.0)))\n",
            "print(new vec3(0.0, 3.0, 4.0).normalized().y, a.dot(a))\n",
        );
        assert_eq!(
            output(src),
            "(1, 2, 2) 10 3\n(2, 4, 4) true true\n(0, 0, 1)\n0.6 9\n"
        );
    }

    #[test]
    fn vec3_default_and_float_constructor() {
        assert_eq!(output("import math\nvec3 v\nprint(v)"), "(0, 0, 0)\n");
        assert_eq!(output("import math\nvec3 v = new vec3(1.5f, 2f, 3f)\nprint(v.y)"), "2\n");
    }

    #[test]
    fn vec3_is_copied_into_collections() {
        let src = concat!(
            "import math\n",
            "vec3 v = new vec3()\n",
            "List<vec3> xs = new List<vec3>()\n",
            "xs.add(v)\n",
            "xs.insert(0, v)\n",
            "Array<vec3> arr = new Array<vec3>(1)\n",
            "arr[0] = v\n",
            "v.x = 5.0\n",
            "print(xs[0].x, xs[1].x, arr[0].x, v.x)\n",
            "vec3 w = xs[1]\n",
            "w.y = 2.0\n",
            "print(xs[1].y)\n",
        );
        assert_eq!(output(src), "0 0 0 5\n0\n");
    }

    #[test]
    fn unsupported_vec3_operator() {
        let err = compiler()
            .compile("import math\nvec3 a\nvec3 b = a / 2.0")
            .err()
            .unwrap();
        assert!(matches!(err.kind, CompileErrorKind::UnsupportedOperator { .. }));
    }
}
