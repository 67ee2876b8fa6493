//! Libraries and the registry they are merged into.
//!
//! A [`Library`] is a named bundle of native functions, keywords, global
//! terms and type descriptors.  A [`Registry`] merges any number of
//! libraries, rejecting name collisions, and is read-only afterwards; wrap it
//! in an `Arc` to share it between compilers and scripts.
//!
//! The system library is always registry entry `0`.  Its first eight types
//! are the primitives whose [`TypeId`](crate::types::TypeId)s are fixed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::compiler::Compiler;
use crate::error::{CompileError, ExecErrorKind, RegistryError};
use crate::exec::{CallCtx, Node};
use crate::stdlib;
use crate::types::{GlobalDef, KeywordDef, KeywordFn, LibId, NativeFunction, ProtoId, Signature, TypeDef};
use crate::term::Value;

// ── Library ───────────────────────────────────────────────────────────────────

/// A named, self-contained bundle of script-visible definitions.
#[derive(Clone)]
pub struct Library {
    name: String,
    functions: Vec<NativeFunction>,
    keywords: Vec<KeywordDef>,
    globals: Vec<GlobalDef>,
    types: Vec<TypeDef>,
}

impl Library {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
            keywords: Vec::new(),
            globals: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a native function.  Several functions may share a name as long as
    /// their signatures differ; calls pick an overload by argument types.
    pub fn function<F>(&mut self, name: &str, sig: Signature, func: F) -> &mut Self
    where
        F: Fn(&mut CallCtx<'_>, &[Value]) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
    {
        self.functions.push(NativeFunction {
            name: name.to_string(),
            sig,
            func: Arc::new(func),
        });
        self
    }

    pub fn keyword<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Compiler, &str) -> Result<Option<Node>, CompileError> + Send + Sync + 'static,
    {
        self.keywords.push(KeywordDef {
            name: name.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Add a singleton term, built by `init` the first time a script uses it.
    pub fn global<F>(&mut self, name: &str, ty: &str, init: F) -> &mut Self
    where
        F: Fn(&mut CallCtx<'_>) -> Result<Value, ExecErrorKind> + Send + Sync + 'static,
    {
        self.globals.push(GlobalDef {
            name: name.to_string(),
            ty: ty.to_string(),
            init: Arc::new(init),
        });
        self
    }

    pub fn add_type(&mut self, def: TypeDef) -> &mut Self {
        self.types.push(def);
        self
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The merged, read-only view of every registered library.
pub struct Registry {
    libraries: Vec<String>,
    types: Vec<(LibId, TypeDef)>,
    type_names: HashMap<String, ProtoId>,
    functions: HashMap<String, (LibId, Vec<NativeFunction>)>,
    keywords: HashMap<String, (LibId, KeywordFn)>,
    globals: HashMap<String, (LibId, GlobalDef)>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("libraries", &self.libraries)
            .field("types", &self.type_names.len())
            .field("functions", &self.functions.len())
            .field("keywords", &self.keywords.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry holding only the system library.
    pub fn new() -> Self {
        let mut reg = Self {
            libraries: Vec::new(),
            types: Vec::new(),
            type_names: HashMap::new(),
            functions: HashMap::new(),
            keywords: HashMap::new(),
            globals: HashMap::new(),
        };
        reg.insert(stdlib::system::library());
        reg
    }

    /// The system library plus `libraries`, registered in order.
    pub fn with_libraries<I>(libraries: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Library>,
    {
        let mut reg = Self::new();
        for lib in libraries {
            reg.register(lib)?;
        }
        Ok(reg)
    }

    /// Merge `lib` into the registry.
    ///
    /// Fails without modifying the registry if the library name, or any of
    /// its type, function, keyword or global names, is already taken, or if a
    /// type derives from a type that is not registered yet.
    pub fn register(&mut self, lib: Library) -> Result<(), RegistryError> {
        self.check(&lib)?;
        debug!(
            library = %lib.name,
            types = lib.types.len(),
            functions = lib.functions.len(),
            keywords = lib.keywords.len(),
            globals = lib.globals.len(),
            "registering library"
        );
        self.insert(lib);
        Ok(())
    }

    fn check(&self, lib: &Library) -> Result<(), RegistryError> {
        if self.libraries.iter().any(|n| *n == lib.name) {
            return Err(RegistryError::DuplicateLibrary(lib.name.clone()));
        }
        let collision = |what: &'static str, name: &str| RegistryError::NameCollision {
            what,
            name: name.to_string(),
            library: lib.name.clone(),
        };

        let mut seen_types: Vec<&str> = Vec::new();
        for def in &lib.types {
            if self.type_names.contains_key(&def.name) || seen_types.contains(&def.name.as_str()) {
                return Err(collision("type", &def.name));
            }
            if let Some(base) = &def.base {
                let base_name = base.split('<').next().unwrap_or(base).trim();
                if !self.type_names.contains_key(base_name) && !seen_types.contains(&base_name) {
                    return Err(RegistryError::UnknownBaseType {
                        ty: def.name.clone(),
                        base: base.clone(),
                    });
                }
            }
            seen_types.push(&def.name);
        }

        let mut seen_fns: Vec<&str> = Vec::new();
        for f in &lib.functions {
            if self.functions.contains_key(&f.name) || self.keywords.contains_key(&f.name) {
                return Err(collision("function", &f.name));
            }
            seen_fns.push(&f.name);
        }
        let mut seen_kws: Vec<&str> = Vec::new();
        for k in &lib.keywords {
            if self.keywords.contains_key(&k.name)
                || self.functions.contains_key(&k.name)
                || seen_kws.contains(&k.name.as_str())
                || seen_fns.contains(&k.name.as_str())
            {
                return Err(collision("keyword", &k.name));
            }
            seen_kws.push(&k.name);
        }
        let mut seen_globals: Vec<&str> = Vec::new();
        for g in &lib.globals {
            if self.globals.contains_key(&g.name) || seen_globals.contains(&g.name.as_str()) {
                return Err(collision("global term", &g.name));
            }
            seen_globals.push(&g.name);
        }
        Ok(())
    }

    fn insert(&mut self, lib: Library) {
        let id = LibId(self.libraries.len() as u32);
        self.libraries.push(lib.name);
        for def in lib.types {
            let proto = ProtoId(self.types.len() as u32);
            self.type_names.insert(def.name.clone(), proto);
            self.types.push((id, def));
        }
        for f in lib.functions {
            self.functions
                .entry(f.name.clone())
                .or_insert_with(|| (id, Vec::new()))
                .1
                .push(f);
        }
        for k in lib.keywords {
            self.keywords.insert(k.name, (id, k.handler));
        }
        for g in lib.globals {
            self.globals.insert(g.name.clone(), (id, g));
        }
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    pub fn library_id(&self, name: &str) -> Option<LibId> {
        self.libraries
            .iter()
            .position(|n| n == name)
            .map(|i| LibId(i as u32))
    }

    pub fn library_name(&self, id: LibId) -> &str {
        &self.libraries[id.index()]
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn proto(&self, name: &str) -> Option<ProtoId> {
        self.type_names.get(name).copied()
    }

    pub fn type_def(&self, proto: ProtoId) -> &TypeDef {
        &self.types[proto.index()].1
    }

    pub fn type_library(&self, proto: ProtoId) -> LibId {
        self.types[proto.index()].0
    }

    pub fn functions(&self, name: &str) -> Option<(LibId, &[NativeFunction])> {
        self.functions.get(name).map(|(id, fs)| (*id, fs.as_slice()))
    }

    pub fn keyword(&self, name: &str) -> Option<(LibId, &KeywordFn)> {
        self.keywords.get(name).map(|(id, k)| (*id, k))
    }

    pub fn global(&self, name: &str) -> Option<(LibId, &GlobalDef)> {
        self.globals.get(name).map(|(id, g)| (*id, g))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
