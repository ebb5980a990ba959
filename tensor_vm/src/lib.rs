// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `tensor_vm`: the tensor VM executable container and its binary codec.
//!
//! An executable packages a table of VM functions made of register-machine
//! instructions, a constant pool of opaque values, two name maps (global
//! functions and primitive operator names), and an opaque host native module
//! holding compiled kernels. This crate defines the instruction set, the
//! container layout, and a bit-stable save/load codec; interpreting the
//! instructions is the runtime's job.
//!
//! ## Example
//!
//! ```
//! extern crate alloc;
//!
//! use alloc::vec;
//!
//! use tensor_vm::executable::{Executable, ExecutableBuilder};
//! use tensor_vm::function::VMFunction;
//! use tensor_vm::instruction::Instruction;
//! use tensor_vm::value::TextValueCodec;
//!
//! let mut b = ExecutableBuilder::new();
//! b.push_function(VMFunction::new(
//!     "main",
//!     vec!["x".into()],
//!     vec![Instruction::ret(0)],
//!     1,
//! ));
//! let exec = b.finish(()).unwrap();
//!
//! let bytes = exec.save(&TextValueCodec);
//! let back: Executable<String> = Executable::load(bytes, (), &TextValueCodec).unwrap();
//! assert_eq!(back.function_arity("main").unwrap(), 1);
//! ```

#![no_std]

extern crate alloc;

pub mod codec;
pub mod disasm;
pub mod executable;
pub mod format;
pub mod function;
pub mod instruction;
pub mod opcode;
pub mod value;
