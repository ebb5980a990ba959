// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! VM functions and the function-record codec.
//!
//! A function record is `name | register_file_size(u64) |
//! num_instructions(u64) | params(vec<string>)` followed by
//! `num_instructions` instruction records.

use alloc::string::String;
use alloc::vec::Vec;

use crate::codec::{self, DecodeError};
use crate::format::{DecodeError as StreamError, Reader, Writer};
use crate::instruction::Instruction;

/// A VM function: metadata plus its instruction body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VMFunction {
    /// Function name, unique across the executable.
    pub name: String,
    /// Parameter names in call order (arity = length).
    pub params: Vec<String>,
    /// Register-file size; at least the highest register index used plus one.
    pub register_file_size: u64,
    /// Instruction body.
    pub instructions: Vec<Instruction>,
}

impl VMFunction {
    /// Creates a function from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        params: Vec<String>,
        instructions: Vec<Instruction>,
        register_file_size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            register_file_size,
            instructions,
        }
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Writes a function record to `w`.
pub fn encode_function(w: &mut Writer, func: &VMFunction) {
    w.write_string(&func.name);
    w.write_u64(func.register_file_size);
    w.write_u64(func.instructions.len() as u64);
    w.write_string_vec(&func.params);
    for instr in &func.instructions {
        codec::encode_instruction(w, instr);
    }
}

/// Reads a function record from `r`.
pub fn decode_function(r: &mut Reader<'_>) -> Result<VMFunction, DecodeError> {
    let name = r.read_string()?;
    let register_file_size = r.read_u64()?;
    let num_instructions = r.read_u64()?;
    let params = r.read_string_vec()?;

    // Each instruction record is at least its 16-byte header.
    let num_instructions =
        usize::try_from(num_instructions).map_err(|_| StreamError::TruncatedStream)?;
    if num_instructions > r.remaining() / 16 {
        return Err(StreamError::TruncatedStream.into());
    }

    let mut instructions = Vec::with_capacity(num_instructions);
    for _ in 0..num_instructions {
        instructions.push(codec::decode_instruction(r)?);
    }

    Ok(VMFunction {
        name,
        params,
        register_file_size,
        instructions,
    })
}
