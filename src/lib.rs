//! A WebAssembly binary decoder and a small stack-based interpreter.
//!
//! [`binary`] turns bytes into sections, [`validation`] links them into one
//! function index space, and [`vm`] runs the result against host functions
//! held in a [`host::HostRegistry`].

pub mod binary;
pub mod error;
pub mod host;
pub mod validation;
pub mod vm;

pub use error::{DecodeError, Error, LinkError, Trap};
pub use host::{HostFunc, HostRegistry};
pub use vm::{Callee, Value, VirtualMachine, VmConfig};
