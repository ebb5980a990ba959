// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler for VM functions.
//!
//! This module provides a structured view ([`Disassembly`], [`InstrLine`])
//! for tooling and tests, and a stable human-readable text format via
//! [`core::fmt::Display`]: per function a header with name, parameters,
//! register-file size and instruction count, then one numbered line per
//! instruction showing the raw serialized record next to its rendering.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::codec::{InstructionRecord, serialize_instruction};
use crate::function::VMFunction;

/// Disassembles `functions` into a structured view.
#[must_use]
pub fn disassemble(functions: &[VMFunction]) -> Disassembly<'_> {
    let functions = functions
        .iter()
        .enumerate()
        .map(|(index, func)| {
            let lines = func
                .instructions
                .iter()
                .map(|instr| InstrLine {
                    record: serialize_instruction(instr),
                    text: instr.to_string(),
                })
                .collect();
            FunctionDisassembly { index, func, lines }
        })
        .collect();
    Disassembly { functions }
}

/// An executable disassembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disassembly<'a> {
    /// Per-function disassemblies in function-index order.
    pub functions: Vec<FunctionDisassembly<'a>>,
}

/// A single-function disassembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDisassembly<'a> {
    index: usize,
    func: &'a VMFunction,
    lines: Vec<InstrLine>,
}

impl FunctionDisassembly<'_> {
    /// Returns the function index within the executable.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the disassembled function.
    #[must_use]
    pub fn func(&self) -> &VMFunction {
        self.func
    }

    /// Returns the per-instruction lines.
    #[must_use]
    pub fn lines(&self) -> &[InstrLine] {
        &self.lines
    }
}

/// One disassembled instruction: its serialized record and rendered text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrLine {
    /// The `(opcode, fields)` record as it appears on the wire.
    pub record: InstructionRecord,
    /// Human-readable rendering.
    pub text: String,
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fd in &self.functions {
            writeln!(
                f,
                "vm function[{}]: {}({})",
                fd.index,
                fd.func.name,
                fd.func.params.join(", ")
            )?;
            writeln!(f, "# register file size = {}", fd.func.register_file_size)?;
            writeln!(f, "# instruction count = {}", fd.lines.len())?;
            writeln!(f, "opcode, fields  # text:")?;
            for (idx, line) in fd.lines.iter().enumerate() {
                write!(f, "{idx:>2}: {}", line.record.opcode)?;
                for field in &line.record.fields {
                    write!(f, " {field}")?;
                }
                writeln!(f, "  # {}", line.text)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use alloc::vec;

    #[test]
    fn single_function_listing() {
        let funcs = [VMFunction::new(
            "main",
            vec!["x".into()],
            vec![Instruction::ret(0)],
            1,
        )];
        let text = disassemble(&funcs).to_string();
        assert!(text.contains("vm function[0]: main(x)"));
        assert!(text.contains("# register file size = 1"));
        assert!(text.contains("# instruction count = 1"));
        assert!(text.contains("0: 1 0"));
        assert!(text.contains("# ret $0"));
    }

    #[test]
    fn empty_function_renders_header_only() {
        let funcs = [VMFunction::new("noop", vec![], vec![], 0)];
        let dis = disassemble(&funcs);
        assert!(dis.functions[0].lines().is_empty());
        let text = dis.to_string();
        assert!(text.contains("vm function[0]: noop()"));
        assert!(text.contains("# instruction count = 0"));
    }
}
