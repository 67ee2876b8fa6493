//! KScript: an embeddable, line-oriented scripting language.
//!
//! Hosts describe their types, functions, keywords and global terms as
//! [`Library`] values, hand them to a [`Compiler`], and compile script text
//! into a [`Script`] that can be executed repeatedly.
//!
//! # Quick start
//!
//! ```rust
//! use ks::{Compiler, Value};
//!
//! let mut script = Compiler::new()
//!     .compile("int x = 6\nint y = x * 7\nprint(\"answer\", y)")
//!     .unwrap();
//! script.execute().unwrap();
//! assert_eq!(script.output(), "answer 42\n");
//! assert_eq!(script.get_term("y"), Some(Value::Int(42)));
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod exec;
pub mod lexer;
pub mod namespace;
pub mod registry;
pub mod script;
pub mod stdlib;
pub mod term;
pub mod types;

pub use compiler::Compiler;
pub use config::{ConfigError, Options};
pub use error::{CompileError, CompileErrorKind, ExecError, ExecErrorKind, RegistryError};
pub use registry::{Library, Registry};
pub use script::Script;
pub use term::Value;
pub use types::{Kind, Signature, TypeDef, TypeId};
