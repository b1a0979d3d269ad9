//! The execution engine.
//!
//! [`Engine`] owns everything a run needs: the loaded assemblies, the
//! resolver indexes, the managed heap, the static-field store, the
//! internal-method registry and the I/O channels. All state is per-engine;
//! constructing two engines yields two fully independent runs.
//!
//! # Execution flow
//!
//! [`Engine::start`] initializes every referenced assembly (running each
//! type's static constructor exactly once, in load order), then invokes the
//! entry point with the program arguments packaged as a `String[]` when the
//! entry point declares one. Execution is a synchronous recursive walk:
//! every method call creates a fresh frame, `ret` hands the top of stack
//! back to the caller.
//!
//! # Failure
//!
//! Unhandled runtime errors abort the run: the engine prints a single-line
//! banner (`A <errorKind> has occured in <moduleName>. The error is:
//! <message>`) followed by the reconstructed call trace, clears the running
//! flag, and unwinds every frame. Recovery is never local - the target
//! workloads are short programs for which partial execution is not useful.

mod error;
mod frame;
mod heap;
mod internals;
mod interpreter;
mod loader;
mod resolver;
mod statics;
pub mod value;

pub use error::RuntimeError;
pub use frame::{EvalStack, Frame, LOCAL_SLOTS};
pub use heap::{ManagedHeap, ObjectInstance};
pub use resolver::{CallKind, Resolution, Resolver};
pub use statics::StaticStore;
pub use value::{BinaryOp, CompareOp, ConvKind, UnaryOp, Value};

use std::{
    io::{BufRead, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::debug;

use crate::{
    metadata::{
        typesystem::{MethodDesc, TypeDesc},
        CilImage,
    },
    Result,
};
use internals::InternalRegistry;

/// The CIL execution engine.
///
/// Construct one with the parsed main assembly and a search directory for
/// referenced assemblies, then call [`start`](Engine::start).
///
/// # Examples
///
/// ```rust,no_run
/// use dotrun::{engine::Engine, CilImage};
/// use std::path::Path;
///
/// let image = CilImage::from_file(Path::new("program.exe"))?;
/// let mut engine = Engine::new(image, Path::new("."))?;
/// engine.start(&[])?;
/// # Ok::<(), dotrun::Error>(())
/// ```
pub struct Engine {
    images: Vec<Arc<CilImage>>,
    resolver: Resolver,
    pub(crate) heap: ManagedHeap,
    pub(crate) statics: StaticStore,
    internals: InternalRegistry,
    running: Arc<AtomicBool>,
    pub(crate) call_log: Vec<String>,
    pub(crate) out: Box<dyn Write>,
    pub(crate) err_out: Box<dyn Write>,
    pub(crate) input: Box<dyn BufRead>,
    // Synthetic descriptors for runtime-provided types, created once so
    // identity comparison keeps working for them
    pub(crate) intptr_ty: Arc<TypeDesc>,
    pub(crate) type_ty: Arc<TypeDesc>,
    pub(crate) handle_ty: Arc<TypeDesc>,
}

impl Engine {
    /// Creates an engine for the given main assembly.
    ///
    /// Referenced assemblies are resolved transitively by probing
    /// `<search-dir>/<name>.exe`, `<search-dir>/<name>.dll`,
    /// `<cwd>/<name>.exe`, `<cwd>/<name>.dll`, in that order, `mscorlib`
    /// first. A missing `mscorlib` file is tolerated (the internal-method
    /// registry provides the base library); any other missing reference is
    /// an error.
    ///
    /// # Arguments
    ///
    /// * `image` - The parsed main assembly.
    /// * `search_dir` - Directory probed for referenced assemblies; must
    ///   exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the search directory does not exist or a
    /// referenced assembly fails to load.
    pub fn new(image: CilImage, search_dir: &Path) -> Result<Engine> {
        if !search_dir.is_dir() {
            return Err(crate::Error::Error(format!(
                "search directory '{}' does not exist",
                search_dir.display()
            )));
        }

        let images = loader::load_all(image, search_dir)?;
        let resolver = Resolver::build(&images);

        let mut internals = InternalRegistry::new();
        internals::register_all(&mut internals);

        Ok(Engine {
            images,
            resolver,
            heap: ManagedHeap::new(),
            statics: StaticStore::new(),
            internals,
            running: Arc::new(AtomicBool::new(true)),
            call_log: Vec::new(),
            out: Box::new(std::io::stdout()),
            err_out: Box::new(std::io::stderr()),
            input: Box::new(std::io::BufReader::new(std::io::stdin())),
            intptr_ty: TypeDesc::synthetic("System", "IntPtr"),
            type_ty: TypeDesc::synthetic("System", "Type"),
            handle_ty: TypeDesc::synthetic("System", "RuntimeTypeHandle"),
        })
    }

    /// Redirects standard output (used by the console internals).
    pub fn set_stdout(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Redirects standard error (used by the diagnostic printer).
    pub fn set_stderr(&mut self, err: Box<dyn Write>) {
        self.err_out = err;
    }

    /// Redirects standard input (used by `Console.ReadLine`).
    pub fn set_stdin(&mut self, input: Box<dyn BufRead>) {
        self.input = input;
    }

    /// Returns the cooperative cancellation flag.
    ///
    /// Clearing the flag stops execution before the next instruction
    /// dispatch; every active frame unwinds cleanly returning null.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Returns the loaded images in load order (main assembly first).
    #[must_use]
    pub fn images(&self) -> &[Arc<CilImage>] {
        &self.images
    }

    /// Returns the resolver over the loaded assemblies.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Runs the program: type initializers first, then the entry point.
    ///
    /// # Arguments
    ///
    /// * `args` - Program arguments, packaged as a `String[]` when the
    ///   entry point takes one.
    ///
    /// # Errors
    ///
    /// Only host-level failures (I/O on the diagnostic channel) surface as
    /// `Err`; runtime errors are reported through the banner and leave the
    /// engine stopped.
    pub fn start(&mut self, args: &[String]) -> Result<()> {
        if let Err(error) = self.run_type_initializers() {
            self.report(&error);
            return Ok(());
        }

        let Some(entry) = self.images[0].entry_point().cloned() else {
            self.report(&RuntimeError::EntryPointNotFound);
            return Ok(());
        };
        debug!("entry point: {entry}");

        let params = if entry.param_count() == 1 {
            let handle = self.heap.alloc_array(args.len());
            for (index, arg) in args.iter().enumerate() {
                self.heap
                    .array_set(handle, index as i64, Value::Str(Arc::from(arg.as_str())))
                    .expect("fresh array fits its own length");
            }
            vec![Value::Array(handle)]
        } else {
            Vec::new()
        };

        if let Err(error) = self.call_method(&entry, None, params) {
            self.report(&error);
        }
        Ok(())
    }

    /// Invokes a named zero-argument method in any loaded assembly.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Namespace of the declaring type.
    /// * `type_name` - Simple name of the declaring type.
    /// * `method` - Method name; the first zero-argument overload wins.
    ///
    /// # Errors
    ///
    /// Only host-level failures surface as `Err`; runtime errors are
    /// reported through the banner.
    pub fn run_method_in_dll(
        &mut self,
        namespace: &str,
        type_name: &str,
        method: &str,
    ) -> Result<()> {
        let full_name = if namespace.is_empty() {
            type_name.to_string()
        } else {
            format!("{namespace}.{type_name}")
        };

        let target = self
            .resolver
            .find_type(&full_name)
            .and_then(|ty| {
                ty.methods
                    .iter()
                    .find(|m| m.name == method && m.param_count() == 0)
                    .cloned()
            });

        match target {
            Some(target) => {
                if let Err(error) = self.call_method(&target, None, Vec::new()) {
                    self.report(&error);
                }
            }
            None => {
                self.report(&RuntimeError::MethodNotFound {
                    name: format!("{full_name}.{method}"),
                    sig: "void()".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Runs every `.cctor` of every loaded type exactly once, in load order.
    fn run_type_initializers(&mut self) -> std::result::Result<(), RuntimeError> {
        let initializers: Vec<Arc<MethodDesc>> = self
            .images
            .iter()
            .flat_map(|image| image.types())
            .flat_map(|ty| &ty.methods)
            .filter(|m| m.name == ".cctor" && m.is_static())
            .cloned()
            .collect();

        for initializer in initializers {
            debug!("running type initializer {initializer}");
            self.call_method(&initializer, None, Vec::new())?;
        }
        Ok(())
    }

    /// Prints the error banner and call trace, then stops the engine.
    fn report(&mut self, error: &RuntimeError) {
        let message = match error {
            RuntimeError::Managed { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let _ = writeln!(
            self.err_out,
            "A {} has occured in {}. The error is: {}",
            error.kind(),
            self.images[0].module_name(),
            message
        );
        for entry in self.call_log.iter().rev() {
            let _ = writeln!(self.err_out, "   at {entry}");
        }
        let _ = self.err_out.flush();

        self.running.store(false, Ordering::Relaxed);
        self.call_log.clear();
    }
}
