//! `luna-vm` — the register-window virtual machine and base library.
//!
//! [`Vm`] executes compiled [`luna_compiler::Chunk`]s: build one with
//! [`Vm::new`], then either [`Vm::run_source`] for the whole pipeline or
//! [`Vm::load`] + [`Vm::call`] for precompiled chunks.

mod ops;
pub mod stdlib;
pub mod vm;

pub use vm::Vm;
