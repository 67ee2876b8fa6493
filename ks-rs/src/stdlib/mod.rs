//! Built-in libraries.
//!
//! [`system`] is registered into every [`Registry`](crate::registry::Registry)
//! and is always imported.  [`math`] is optional: pass
//! [`math::library()`] to the compiler and `import math` in the script.

pub mod keywords;
pub mod math;
pub mod system;

use std::rc::Rc;

use crate::error::ExecErrorKind;
use crate::term::{ListObj, Value};

// ── Argument helpers ──────────────────────────────────────────────────────────
//
// Arguments reach natives already converted to the declared parameter types,
// so a mismatch here means the host registered an inconsistent signature.

pub(crate) fn arg(args: &[Value], i: usize) -> Result<&Value, ExecErrorKind> {
    args.get(i)
        .ok_or_else(|| ExecErrorKind::Native(format!("missing argument {}", i + 1)))
}

pub(crate) fn arg_int(args: &[Value], i: usize) -> Result<i64, ExecErrorKind> {
    arg(args, i)?
        .as_i64()
        .ok_or_else(|| ExecErrorKind::Native(format!("argument {} is not an integer", i + 1)))
}

pub(crate) fn arg_f64(args: &[Value], i: usize) -> Result<f64, ExecErrorKind> {
    arg(args, i)?
        .as_f64()
        .ok_or_else(|| ExecErrorKind::Native(format!("argument {} is not a number", i + 1)))
}

pub(crate) fn arg_str(args: &[Value], i: usize) -> Result<&str, ExecErrorKind> {
    arg(args, i)?
        .as_str()
        .ok_or_else(|| ExecErrorKind::Native(format!("argument {} is not a string", i + 1)))
}

pub(crate) fn recv_str(recv: &Value) -> Result<&str, ExecErrorKind> {
    recv.as_str()
        .ok_or_else(|| ExecErrorKind::Native("receiver is not a string".into()))
}

pub(crate) fn recv_list(recv: &Value) -> Result<&Rc<ListObj>, ExecErrorKind> {
    recv.as_list()
        .ok_or_else(|| ExecErrorKind::Native("receiver is not a list".into()))
}

/// Check `index` against a collection of `len` items.
pub(crate) fn index_in(index: i64, len: usize) -> Result<usize, ExecErrorKind> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(ExecErrorKind::IndexOutOfRange { index, len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_bounds() {
        assert_eq!(index_in(0, 1), Ok(0));
        assert_eq!(index_in(1, 1), Err(ExecErrorKind::IndexOutOfRange { index: 1, len: 1 }));
        assert_eq!(index_in(-1, 3), Err(ExecErrorKind::IndexOutOfRange { index: -1, len: 3 }));
    }

    #[test]
    fn argument_views() {
        let args = [Value::Int(4), Value::from("s"), Value::Double(0.5)];
        assert_eq!(arg_int(&args, 0), Ok(4));
        assert_eq!(arg_str(&args, 1), Ok("s"));
        assert_eq!(arg_f64(&args, 0), Ok(4.0));
        assert!(arg_int(&args, 2).is_err());
        assert!(arg(&args, 3).is_err());
    }
}
