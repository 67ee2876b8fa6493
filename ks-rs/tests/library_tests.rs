//! Host libraries: custom types, natives, globals, keywords and call nodes.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ks::exec::{eval, run_block, Flow, Node, Runtime, TokenCall};
use ks::stdlib::math;
use ks::types::EQUALITY;
use ks::{
    CompileError, CompileErrorKind, Compiler, ExecError, ExecErrorKind, Kind, Library, Registry,
    RegistryError, Signature, TypeDef, TypeId, Value,
};

// ── A small host library ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Pet {
    name: String,
    sound: &'static str,
}

impl fmt::Display for Pet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn pet(v: &Value) -> Result<Pet, ExecErrorKind> {
    v.with_host(|p: &Pet| p.clone())
        .ok_or_else(|| ExecErrorKind::Native("not a pet".into()))
}

fn name_arg(args: &[Value]) -> Result<String, ExecErrorKind> {
    args.first()
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ExecErrorKind::Native("expected a name".into()))
}

fn zoo() -> Library {
    let mut lib = Library::new("zoo");
    lib.add_type(
        TypeDef::new("Animal", Kind::Host)
            .abstract_type()
            .compare(EQUALITY)
            .field("name", "string", |_, recv| Ok(Value::from(pet(recv)?.name)))
            .method("speak", Signature::new("string", &[]), |_, recv, _| {
                Ok(Value::from(pet(recv)?.sound))
            }),
    );
    lib.add_type(
        TypeDef::new("Dog", Kind::Host)
            .base("Animal")
            .compare(EQUALITY)
            .constructor(&["string"], |ctx, args| {
                Ok(ctx.host(Pet { name: name_arg(args)?, sound: "woof" }))
            }),
    );
    lib.add_type(
        TypeDef::new("Cat", Kind::Host)
            .base("Animal")
            .compare(EQUALITY)
            .constructor(&["string"], |ctx, args| {
                Ok(ctx.host(Pet { name: name_arg(args)?, sound: "meow" }))
            }),
    );
    lib.function(
        "tally",
        Signature::new("string", &["int"]).with_rest("int"),
        |_, args| {
            let first = args.first().and_then(|v| v.as_i64()).unwrap_or_default();
            let rest = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(Value::from(format!("{first} {rest}")))
        },
    );
    lib.function("names", Signature::new("string", &[]).with_rest("Animal"), |_, args| {
        let items = args.first().and_then(|v| v.items()).unwrap_or_default();
        let names: Vec<String> = items.iter().map(|v| v.to_string()).collect();
        Ok(Value::from(names.join("+")))
    });
    lib.global("visits", "int", |_| Ok(Value::Int(0)));
    lib
}

/// Refers to `zoo`'s types.
fn kennel() -> Library {
    let mut lib = Library::new("kennel");
    lib.function("adopt", Signature::new("Dog", &["string"]), |ctx, args| {
        Ok(ctx.host(Pet { name: name_arg(args)?, sound: "woof" }))
    });
    lib
}

fn compiler() -> Compiler {
    Compiler::with_libraries([zoo(), kennel()]).unwrap()
}

fn output(compiler: &mut Compiler, src: &str) -> String {
    let mut script = compiler
        .compile(src)
        .unwrap_or_else(|e| panic!("compile failed: {e}\n{src}"));
    script
        .execute()
        .unwrap_or_else(|e| panic!("execute failed: {e}\n{src}"));
    script.take_output()
}

fn compile_err(src: &str) -> CompileErrorKind {
    match compiler().compile(src) {
        Ok(_) => panic!("expected a compile error:\n{src}"),
        Err(e) => e.kind,
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

#[test]
fn registry_rejects_collisions() {
    let err = Registry::with_libraries([zoo(), zoo()]).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateLibrary("zoo".into()));

    let mut clash = Library::new("clash");
    clash.function("print", Signature::new("void", &[]), |_, _| Ok(Value::Null));
    let err = Registry::with_libraries([clash]).unwrap_err();
    assert!(matches!(err, RegistryError::NameCollision { ref name, .. } if name == "print"));

    let mut orphan = Library::new("orphan");
    orphan.add_type(TypeDef::new("Puppy", Kind::Host).base("Dog"));
    let err = Registry::with_libraries([orphan]).unwrap_err();
    assert_eq!(
        err,
        RegistryError::UnknownBaseType { ty: "Puppy".into(), base: "Dog".into() }
    );
}

#[test]
fn library_names_need_import() {
    assert_eq!(compile_err("Dog d"), CompileErrorKind::UnknownType("Dog".into()));
    assert_eq!(
        compile_err("string s = tally(1)"),
        CompileErrorKind::UnknownFunction("tally".into())
    );
    assert_eq!(compile_err("int v = visits"), CompileErrorKind::UnknownTerm("visits".into()));
    let src = "import zoo\nimport zoo\nDog d = new Dog(\"a\")";
    assert!(compiler().compile(src).is_ok());
}

#[test]
fn libraries_compose() {
    let src = "import zoo\nimport kennel\nDog d = adopt(\"fido\")\nprint(d.name, d.speak())";
    assert_eq!(output(&mut compiler(), src), "fido woof\n");
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[test]
fn subtypes_assign_upwards_only() {
    let src = concat!(
        "import zoo\n",
        "Animal a = new Dog(\"rex\")\n",
        "print(typeof(a), a.name, a.speak())\n",
        "Animal none = null\n",
        "print(none == null, a == null)\n",
    );
    assert_eq!(output(&mut compiler(), src), "Dog rex woof\ntrue false\n");

    let down = "import zoo\nAnimal a = new Dog(\"rex\")\nDog d = a";
    assert_eq!(
        compile_err(down),
        CompileErrorKind::InvalidAssignment { declared: "Dog".into(), source: "Animal".into() }
    );
    let across = "import zoo\nCat c = new Dog(\"rex\")";
    assert!(matches!(compile_err(across), CompileErrorKind::InvalidAssignment { .. }));
}

#[test]
fn abstract_types_cannot_be_constructed() {
    let src = "import zoo\nAnimal a = new Animal(\"x\")";
    assert_eq!(compile_err(src), CompileErrorKind::NotConstructable("Animal".into()));
}

#[test]
fn downcasts_are_checked_at_run_time() {
    let src = "import zoo\nAnimal a = new Dog(\"rex\")\nDog d = a as Dog\nprint(d.name)";
    assert_eq!(output(&mut compiler(), src), "rex\n");

    let mut script = compiler()
        .compile("import zoo\nAnimal a = new Cat(\"tom\")\nDog d = a as Dog")
        .unwrap();
    let err = script.execute().unwrap_err();
    assert_eq!(err.line, 3);
    assert_eq!(
        err.kind,
        ExecErrorKind::InvalidCast { from: "Cat".into(), to: "Dog".into() }
    );
}

#[test]
fn host_objects_compare_by_payload() {
    let src = concat!(
        "import zoo\n",
        "Dog a = new Dog(\"rex\")\n",
        "Dog b = new Dog(\"rex\")\n",
        "Dog c = new Dog(\"max\")\n",
        "print(a == b, a != c)\n",
    );
    assert_eq!(output(&mut compiler(), src), "true true\n");
}

// ── Natives ───────────────────────────────────────────────────────────────────

#[test]
fn variadic_natives_collect_the_tail() {
    let mut c = compiler();
    assert_eq!(output(&mut c, "import zoo\nprint(tally(1, 2, 3))"), "1 [2, 3]\n");
    assert_eq!(output(&mut c, "import zoo\nprint(tally(1))"), "1 []\n");
    let src = "import zoo\nArray<int> xs = new Array<int>(2)\nxs[1] = 9\nprint(tally(5, xs))";
    assert_eq!(output(&mut c, src), "5 [0, 9]\n");

    let err = compile_err("import zoo\nstring s = tally()");
    assert!(matches!(err, CompileErrorKind::ArgumentMismatch { .. }));
    let err = compile_err("import zoo\nstring s = tally(1, \"two\")");
    assert_eq!(
        err,
        CompileErrorKind::ArgumentMismatch { name: "tally".into(), args: "int, string".into() }
    );
}

#[test]
fn variadic_tail_accepts_subtypes() {
    let src = "import zoo\nprint(names(new Dog(\"a\"), new Cat(\"b\")))";
    assert_eq!(output(&mut compiler(), src), "a+b\n");
}

#[test]
fn globals_survive_executions() {
    let mut script = compiler()
        .compile("import zoo\nint local = 0\nvisits += 1\nlocal += 1")
        .unwrap();
    for _ in 0..3 {
        script.execute().unwrap();
    }
    assert_eq!(script.get_term("visits"), Some(Value::Int(3)));
    assert_eq!(script.get_term("local"), Some(Value::Int(1)));
}

#[test]
fn native_errors_abort_execution() {
    let mut lib = Library::new("fail");
    lib.function("explode", Signature::new("void", &[]), |_, _| {
        Err(ExecErrorKind::Native("kaboom".into()))
    });
    let mut script = Compiler::with_libraries([lib])
        .unwrap()
        .compile("import fail\nprint(1)\nexplode()\nprint(2)")
        .unwrap();
    let err = script.execute().unwrap_err();
    assert_eq!(err, ExecError::new(3, ExecErrorKind::Native("kaboom".into())));
    assert_eq!(script.output(), "1\n");
}

// ── Keywords and custom call nodes ────────────────────────────────────────────

/// `repeat <count>` followed by a block.
struct Repeat {
    count: Node,
    body: Vec<Node>,
    line: usize,
    calls: Arc<AtomicUsize>,
    prepared: Arc<AtomicUsize>,
}

impl TokenCall for Repeat {
    fn line(&self) -> usize {
        self.line
    }
    fn ty(&self) -> TypeId {
        TypeId::VOID
    }
    fn call(&self, rt: &mut Runtime<'_>) -> Result<Flow, ExecError> {
        let n = eval(self.count.as_ref(), rt)?.as_i64().unwrap_or(0);
        for _ in 0..n {
            match run_block(&self.body, rt)? {
                Flow::Break => break,
                ret @ Flow::Return(_) => return Ok(ret),
                Flow::Normal(_) | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal(Value::Null))
    }
    fn pre_execution(&self, _rt: &mut Runtime<'_>) -> Result<(), ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn post_compilation(&self, _rt: &mut Runtime<'_>) -> Result<(), ExecError> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn is_statement(&self) -> bool {
        true
    }
    fn name(&self) -> &str {
        "repeat"
    }
    fn children(&self) -> Vec<&dyn TokenCall> {
        std::iter::once(self.count.as_ref())
            .chain(self.body.iter().map(|n| n.as_ref()))
            .collect()
    }
}

fn looping(calls: Arc<AtomicUsize>, prepared: Arc<AtomicUsize>) -> Library {
    let mut lib = Library::new("looping");
    lib.keyword("repeat", move |c: &mut Compiler, rest: &str| -> Result<Option<Node>, CompileError> {
        let line = c.line();
        let count = c.compile_expr(rest)?;
        c.check_assignable(count.as_ref(), TypeId::INT)?;
        c.enter_loop();
        let body = c.read_block();
        c.exit_loop();
        let node: Node = Box::new(Repeat {
            count,
            body: body?,
            line,
            calls: Arc::clone(&calls),
            prepared: Arc::clone(&prepared),
        });
        Ok(Some(node))
    });
    lib
}

#[test]
fn custom_keyword_builds_custom_node() {
    let calls = Arc::new(AtomicUsize::new(0));
    let prepared = Arc::new(AtomicUsize::new(0));
    let mut c = Compiler::with_libraries([looping(Arc::clone(&calls), Arc::clone(&prepared))]).unwrap();
    let src = concat!(
        "import looping\n",
        "int n = 0\n",
        "repeat 2 + 3\n",
        "{\n",
        "    n += 1\n",
        "    if (n == 4)\n",
        "    {\n",
        "        break\n",
        "    }\n",
        "}\n",
        "print(n)\n",
    );
    let mut script = c.compile(src).unwrap();
    assert_eq!(prepared.load(Ordering::SeqCst), 1);
    assert_eq!(script.nodes()[1].name(), "repeat");

    script.execute().unwrap();
    script.execute().unwrap();
    assert_eq!(script.take_output(), "4\n4\n");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn custom_keyword_needs_import_and_checks_arguments() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut c = Compiler::with_libraries([looping(Arc::clone(&counter), counter)]).unwrap();
    assert!(c.compile("repeat 2\n{\n}").is_err());
    let err = c.compile("import looping\nrepeat \"x\"\n{\n}").unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::InvalidAssignment { .. }));
    let err = c.compile("import looping\nrepeat 1\n{\ncontinue\n}\nbreak").unwrap_err();
    assert_eq!(err.line, 6);
}

// ── Sharing ───────────────────────────────────────────────────────────────────

#[test]
fn registry_is_shared_across_threads() {
    let registry = Arc::new(Registry::with_libraries([zoo(), math::library()]).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let src = format!("import math\nimport zoo\nDog d = new Dog(\"d{i}\")\nprint(d.name, max({i}, 2))");
                let mut script = Compiler::with_registry(registry).compile(&src).unwrap();
                script.execute().unwrap();
                script.take_output()
            })
        })
        .collect();
    let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outputs, vec!["d0 2\n", "d1 2\n", "d2 2\n", "d3 3\n"]);
}

#[test]
fn math_library_end_to_end() {
    let mut c = Compiler::with_libraries([math::library()]).unwrap();
    let src = concat!(
        "import math\n",
        "vec3 v = new vec3(2.0, 3.0, 6.0)\n",
        "double len = v.length()\n",
        "vec3 doubled = v * 2.0\n",
        "print(len, doubled, pow(2.0, 10.0), min(3, -1))\n",
    );
    assert_eq!(output(&mut c, src), "7 (4, 6, 12) 1024 -1\n");
}
