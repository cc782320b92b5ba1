//! Runtime bridge to the DirectX Shader Compiler (DXC)
//!
//! This crate loads `libdxcompiler.so` / `dxcompiler.dll` at process runtime,
//! drives its COM-style compiler and utility objects over hand-declared
//! vtables, and exposes a safe Rust API for compiling HLSL to SPIR-V:
//! - Dynamic library loading and symbol resolution ([`Loader`])
//! - Compiler instance management ([`Compiler`], [`CompileOptions`])
//! - Caller-supplied include resolution ([`IncludeResolver`])
//! - Owned compilation outcomes ([`CompilationResult`])
//!
//! The native compiler itself is an opaque dependency; this crate only
//! manages lifecycle, ownership, and text encoding at the boundary.
//!
//! # Example
//!
//! ```ignore
//! use glint_dxc::{CompileOptions, Compiler, Loader};
//!
//! let loader = Loader::open()?;
//! let compiler = Compiler::new(loader)?;
//! let options = CompileOptions::new("main", "vs_6_5", "vulkan1.3");
//! let result = compiler.compile(source, &options, None)?;
//! if result.is_successful() {
//!     upload(result.bytecode());
//! }
//! ```

pub mod com;
pub mod compiler;
pub mod encoding;
pub mod include;
pub mod loader;
pub mod result;

pub use compiler::{CompileError, CompileOptions, Compiler, CreateError};
pub use include::IncludeResolver;
pub use loader::{LoadError, Loader};
pub use result::CompilationResult;
