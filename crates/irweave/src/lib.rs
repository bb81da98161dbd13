//! irweave: iterator adapters and element accessors over an IR graph,
//! usable from Rust and across a C boundary.
//!
//! The [`adapter`] module holds the generic range-walking template, [`iter`]
//! instantiates it once per traversable collection, and [`ffi`] exposes the
//! same operations as `extern "C"` functions with opaque handles. Modules to
//! walk come from [`load_wasm`], which imports a WebAssembly binary into an
//! [`irweave_ir::Module`].

pub mod adapter;
pub mod ffi;
pub mod iter;
pub mod walk;
mod wasm;

pub use adapter::{Adapter, Indexed, Traversal};
pub use anyhow::{Context, Result};
pub use irweave_ir as ir;
pub use irweave_ir::Module;
pub use walk::{walk_function, walk_module, WalkOptions};

/// Configuration options for the WebAssembly importer.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Name given to the imported module.
    pub module_name: String,
    /// Recorded as the module's source file name, and as the file of debug
    /// locations when `debug_offsets` is set.
    pub source_filename: String,
    /// Give functions and globals without an export internal linkage.
    pub internalize: bool,
    /// Mark imported functions and the calls to them `nounwind`.
    pub nounwind_imports: bool,
    /// Attach the byte offset of each operator as the column of a debug
    /// location on the instructions it produces.
    pub debug_offsets: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            module_name: "wasm".to_string(),
            source_filename: String::new(),
            internalize: true,
            nounwind_imports: true,
            debug_offsets: false,
        }
    }
}

/// Imports a WebAssembly binary.
///
/// # Example
/// ```no_run
/// use irweave::{load_wasm, LoadOptions};
///
/// let wasm_bytes = std::fs::read("input.wasm").unwrap();
/// let module = load_wasm(&wasm_bytes, &LoadOptions::default()).unwrap();
/// for function in irweave::iter::functions(&module) {
///     println!("{}", function.name());
/// }
/// ```
pub fn load_wasm(wasm_bytes: &[u8], options: &LoadOptions) -> Result<Module> {
    let parsed = wasm::parse_wasm(wasm_bytes).context("failed to parse WebAssembly module")?;
    let module = wasm::lower(&parsed, options).context("failed to import WebAssembly module")?;
    log::debug!(
        "imported '{}': {} functions, {} globals",
        module.name(),
        module.functions().len(),
        module.globals().len()
    );
    Ok(module)
}
