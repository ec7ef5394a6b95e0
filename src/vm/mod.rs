//! The virtual machine: owns the heap, global environment, symbol/string
//! tables, and the value stack, and drives the scan -> parse -> macroexpand
//! -> compile -> execute pipeline end to end. Grounded on `istate.hpp` (the
//! VM object itself) and `main.cpp`'s top-level `eval_string` driver.

pub mod exec;
pub mod istate;
pub mod opcode;
pub mod table;

use crate::builtin::{self, BuiltinRegistry};
use crate::config::VmOptions;
use crate::error::{FnError, FnErrorKind, FnResult};
use crate::expander::{ExpandCtx, Expander};
use crate::gc::{Heap, Tracer};
use crate::llir::Llir;
use crate::namespace::GlobalEnv;
use crate::object::{self, FnTracer};
use crate::reader::{self, SourceLoc, StrTable};
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::{Tag, Value};
use istate::IState;
use std::collections::{HashMap, HashSet};

pub struct Vm<T: Tracer> {
    pub heap: Heap<T>,
    pub sst: SymbolTable,
    pub strtab: StrTable,
    pub globals: GlobalEnv,
    pub macros: HashMap<SymbolId, Value>,
    pub istate: IState,
    pub builtins: BuiltinRegistry<T>,
    pub root_ns: SymbolId,
    pub loaded_modules: HashSet<String>,
    /// Resolver the driver (CLI/library caller) supplies for `(import "x")`:
    /// given a module path, returns that module's source text.
    pub module_loader: Option<Box<dyn Fn(&str) -> Option<String>>>,
}

impl Vm<FnTracer> {
    pub fn new(opts: &VmOptions) -> Self {
        let mut sst = SymbolTable::new();
        let globals = GlobalEnv::new(&mut sst);
        let root_ns = globals.root_ns;
        let mut vm = Self {
            heap: Heap::new(opts, FnTracer),
            sst,
            strtab: StrTable::new(),
            globals,
            macros: HashMap::default(),
            istate: IState::new(opts.stack_size),
            builtins: BuiltinRegistry::default(),
            root_ns,
            loaded_modules: HashSet::new(),
            module_loader: None,
        };
        builtin::install(&mut vm);
        vm
    }

    /// Run the full pipeline over `source`, evaluating every top-level form
    /// in order and returning the last one's value (`nil` for an empty
    /// source string). A `defmacro` form is compiled and executed
    /// immediately so later forms in the same source see it, mirroring a
    /// REPL evaluating one form at a time.
    pub fn eval_source(&mut self, source: &str, file: &str) -> FnResult<Value> {
        let forms = reader::parse_string(source, file, &mut self.strtab)?;
        let mut last = Value::nil();
        for form in &forms {
            last = self.eval_top_form(form, file)?;
        }
        Ok(last)
    }

    fn eval_top_form(&mut self, form: &reader::Node, file: &str) -> FnResult<Value> {
        let llir = self.expand_form(form, file)?;
        self.run_llir(&llir)
    }

    fn expand_form(&mut self, form: &reader::Node, file: &str) -> FnResult<Llir> {
        let mut expander = Expander {
            ctx: self,
            file: file.to_string(),
        };
        expander.expand(form)
    }

    fn run_llir(&mut self, llir: &Llir) -> FnResult<Value> {
        let ns = self.root_ns;
        let stub = crate::compiler::compile_toplevel(&mut self.sst, &mut self.heap, ns, llir);
        let mut roots = self.gc_roots();
        let func = object::alloc_function(&mut self.heap, stub, Vec::new(), Vec::new(), &mut roots);
        let v = self.call_value(func, Vec::new())?;
        if let Llir::Defmacro(name, _) = llir {
            self.macros.insert(*name, v);
        }
        Ok(v)
    }

    pub(crate) fn load_import(&mut self, path: &str) -> FnResult<()> {
        if self.loaded_modules.contains(path) {
            return Ok(());
        }
        self.loaded_modules.insert(path.to_string());
        let Some(loader) = self.module_loader.as_ref() else {
            return Err(self.err_here(FnErrorKind::Runtime, format!("no module loader installed for import \"{path}\"")));
        };
        let Some(source) = loader(path) else {
            return Err(self.err_here(FnErrorKind::Runtime, format!("module not found: {path}")));
        };
        self.eval_source(&source, path)?;
        Ok(())
    }

}

impl<T: Tracer> Vm<T> {
    pub(crate) fn err_here(&self, kind: FnErrorKind, msg: impl Into<String>) -> FnError {
        FnError::new(kind, SourceLoc::default(), "<runtime>".to_string(), msg)
    }

    /// Every `Value` slot outside the heap a collection triggered mid-call
    /// must not silently drop: the operand stack and every namespace's
    /// globals and macros. Doesn't cover a builtin's own argument slice or
    /// opcode handlers' popped-off-the-stack locals — those are passed as
    /// extra roots at their own call sites.
    pub(crate) fn gc_roots(&mut self) -> Vec<*mut Value> {
        let mut roots: Vec<*mut Value> = self.istate.stack.iter_mut().map(|v| v as *mut Value).collect();
        roots.extend(self.globals.globals.iter_mut().map(|v| v as *mut Value));
        roots.extend(self.macros.values_mut().map(|v| v as *mut Value));
        roots
    }

    /// Render a value for `print`/error messages. Not the reader's syntax
    /// (no re-escaping), just a debug-legible form.
    pub fn display(&self, v: Value) -> String {
        match v.tag() {
            Tag::Num => format!("{}", v.as_num().unwrap()),
            Tag::Nil => "nil".to_string(),
            Tag::Yes => "yes".to_string(),
            Tag::No => "no".to_string(),
            Tag::Empty => "()".to_string(),
            Tag::Unin => "#unin".to_string(),
            Tag::Sym => self.sst.symbol_name(v.as_sym().unwrap()).to_string(),
            Tag::String => String::from_utf8_lossy(object::string_bytes(v).unwrap_or(&[])).into_owned(),
            Tag::Cons => self.display_list(v),
            Tag::Vector => "#vector".to_string(),
            Tag::Table => "#table".to_string(),
            Tag::Func => "#fn".to_string(),
        }
    }

    fn display_list(&self, mut v: Value) -> String {
        let mut parts = Vec::new();
        loop {
            match v.tag() {
                Tag::Cons => {
                    let ptr = v.as_ptr().unwrap() as *mut object::ConsCell;
                    unsafe {
                        parts.push(self.display((*ptr).head));
                        v = (*ptr).tail;
                    }
                }
                Tag::Empty | Tag::Nil => break,
                _ => {
                    parts.push(".".to_string());
                    parts.push(self.display(v));
                    break;
                }
            }
        }
        format!("({})", parts.join(" "))
    }
}

impl ExpandCtx for Vm<FnTracer> {
    fn intern(&mut self, name: &str) -> SymbolId {
        self.sst.intern(name)
    }

    fn gensym(&mut self) -> SymbolId {
        self.sst.gensym()
    }

    fn symbol_name(&self, id: SymbolId) -> String {
        self.sst.symbol_name(id).to_string()
    }

    fn strtab_name(&self, id: reader::StrId) -> String {
        self.strtab.name(id).to_string()
    }

    fn strtab_intern(&mut self, name: &str) -> reader::StrId {
        self.strtab.intern(name)
    }

    fn alloc_string(&mut self, bytes: &[u8]) -> Value {
        let mut roots = self.gc_roots();
        object::alloc_string(&mut self.heap, bytes, &mut roots)
    }

    fn alloc_cons(&mut self, mut head: Value, mut tail: Value) -> Value {
        let mut roots = self.gc_roots();
        roots.push(&mut head);
        roots.push(&mut tail);
        object::alloc_cons(&mut self.heap, head, tail, &mut roots)
    }

    fn cons_parts(&self, v: Value) -> (Value, Value) {
        let ptr = v.as_ptr().unwrap() as *mut object::ConsCell;
        unsafe { ((*ptr).head, (*ptr).tail) }
    }

    fn lookup_macro(&self, sym: SymbolId) -> Option<Value> {
        self.macros.get(&sym).copied()
    }

    fn call_macro(&mut self, macro_fn: Value, args: Vec<Value>) -> FnResult<Value> {
        self.call_value(macro_fn, args)
    }
}

/// `vsame` is raw bit identity; this is the richer `=` structural equality
/// built-in forms and table lookups use.
pub fn value_eq(a: Value, b: Value) -> bool {
    match (a.tag(), b.tag()) {
        (Tag::Num, Tag::Num) => a.as_num() == b.as_num(),
        (Tag::Sym, Tag::Sym) => a.as_sym() == b.as_sym(),
        (Tag::String, Tag::String) => object::string_bytes(a) == object::string_bytes(b),
        _ => crate::value::vsame(a, b),
    }
}
