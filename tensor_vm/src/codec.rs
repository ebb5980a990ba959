// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction-record codec.
//!
//! Every instruction serializes to a record `opcode(u64) | field_count(u64) |
//! field_count x i64`. The per-opcode field order is the wire contract; for
//! opcodes with a variable-length tail the count that sizes the tail sits at
//! a fixed prefix position (see [`Opcode::layout`]), so decoding is a single
//! forward pass.

use alloc::vec::Vec;
use core::fmt;

use crate::format::{DecodeError as StreamError, Reader, Writer};
use crate::instruction::{DataType, Index, Instruction};
use crate::opcode::Opcode;

/// A serialized instruction: opcode discriminant plus a dense field array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionRecord {
    /// Wire discriminant of the opcode.
    pub opcode: u64,
    /// Opcode-specific fields, fixed prefix first, variable tail last.
    pub fields: Vec<Index>,
}

/// An instruction decode error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The underlying byte stream was malformed.
    Stream(StreamError),
    /// The opcode discriminant is not recognized.
    UnknownOpcode {
        /// The unrecognized discriminant.
        opcode: u64,
    },
    /// The field count does not match the opcode's layout.
    MalformedInstruction {
        /// Opcode being decoded.
        opcode: Opcode,
        /// Field count required by the layout (including any tail).
        expected: usize,
        /// Field count found in the record.
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "instruction stream error: {e}"),
            Self::UnknownOpcode { opcode } => write!(f, "unknown opcode {opcode}"),
            Self::MalformedInstruction {
                opcode,
                expected,
                actual,
            } => write!(
                f,
                "malformed {} instruction: expected {expected} fields, found {actual}",
                opcode.name()
            ),
        }
    }
}

impl core::error::Error for DecodeError {}

impl From<StreamError> for DecodeError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

/// Serializes an instruction into its `(opcode, fields)` record.
#[must_use]
pub fn serialize_instruction(instr: &Instruction) -> InstructionRecord {
    let mut fields: Vec<Index> = Vec::new();
    match instr {
        Instruction::Move { from, dst } => fields.extend([*from, *dst]),
        Instruction::Ret { result } => fields.push(*result),
        Instruction::Fatal | Instruction::CudaStreamBarrier => {}
        Instruction::InvokePacked {
            packed_index,
            output_size,
            args,
        } => {
            fields.extend([*packed_index, args.len() as Index, *output_size]);
            fields.extend_from_slice(args);
        }
        Instruction::AllocTensor {
            storage,
            offset,
            dtype,
            own,
            dst,
            shape,
        } => {
            fields.extend([
                *storage,
                *offset,
                dtype.code,
                dtype.bits,
                dtype.lanes,
                Index::from(*own),
                shape.len() as Index,
                *dst,
            ]);
            fields.extend_from_slice(shape);
        }
        Instruction::AllocTensorReg {
            storage,
            offset,
            shape_register,
            dtype,
            dst,
            own,
        } => fields.extend([
            *storage,
            *offset,
            *shape_register,
            dtype.code,
            dtype.bits,
            dtype.lanes,
            *dst,
            Index::from(*own),
        ]),
        Instruction::AllocStorage {
            alloc_size,
            alignment,
            dtype,
            device_type,
            device_id,
            dst,
        } => fields.extend([
            *alloc_size,
            *alignment,
            dtype.code,
            dtype.bits,
            dtype.lanes,
            *device_type,
            *device_id,
            *dst,
        ]),
        Instruction::Free { memory } => fields.push(*memory),
        Instruction::AllocTuple { dst, fields: elems } => {
            fields.extend([elems.len() as Index, *dst]);
            fields.extend_from_slice(elems);
        }
        Instruction::AllocClosure {
            func_index,
            dst,
            free_vars,
        } => {
            fields.extend([*func_index, free_vars.len() as Index, *dst]);
            fields.extend_from_slice(free_vars);
        }
        Instruction::SetShape { data, shape, dst } => fields.extend([*data, *shape, *dst]),
        Instruction::If {
            test,
            target,
            true_offset,
            false_offset,
        } => fields.extend([*test, *target, *true_offset, *false_offset]),
        Instruction::InvokeFunc {
            func_index,
            dst,
            args,
        } => {
            fields.extend([*func_index, args.len() as Index, *dst]);
            fields.extend_from_slice(args);
        }
        Instruction::InvokeClosure { closure, dst, args } => {
            fields.extend([*closure, args.len() as Index, *dst]);
            fields.extend_from_slice(args);
        }
        Instruction::LoadConst { const_index, dst } => fields.extend([*const_index, *dst]),
        Instruction::LoadConsti { imm, dst } => fields.extend([*imm, *dst]),
        Instruction::GetField {
            object,
            field_index,
            dst,
        } => fields.extend([*object, *field_index, *dst]),
        Instruction::Goto { pc_offset } => fields.push(*pc_offset),
        Instruction::InvokeJit {
            op_reg,
            output_size,
            args,
        } => {
            fields.extend([*op_reg, args.len() as Index, *output_size]);
            fields.extend_from_slice(args);
        }
        Instruction::InferType { op_reg, dst, args } => {
            fields.extend([*op_reg, args.len() as Index, *dst]);
            fields.extend_from_slice(args);
        }
        Instruction::CudaSetStream {
            device_id,
            stream_id,
        } => fields.extend([*device_id, *stream_id]),
        Instruction::CudaAddEvent {
            event_id,
            stream_id,
        }
        | Instruction::CudaWaitEvent {
            event_id,
            stream_id,
        } => fields.extend([*event_id, *stream_id]),
    }

    InstructionRecord {
        opcode: instr.opcode().code(),
        fields,
    }
}

/// Computes the field count the layout requires for `fields`, reading the
/// tail count out of the fixed prefix where the opcode has one.
fn expected_fields(opcode: Opcode, fields: &[Index]) -> Result<usize, DecodeError> {
    let layout = opcode.layout();
    let malformed = |expected| DecodeError::MalformedInstruction {
        opcode,
        expected,
        actual: fields.len(),
    };

    if fields.len() < layout.prefix {
        return Err(malformed(layout.prefix));
    }
    let Some(pos) = layout.tail_count_at else {
        return Ok(layout.prefix);
    };
    let tail = usize::try_from(fields[pos]).map_err(|_| malformed(layout.prefix))?;
    layout
        .prefix
        .checked_add(tail)
        .ok_or_else(|| malformed(layout.prefix))
}

/// Deserializes an instruction record back into an [`Instruction`].
///
/// The total field count must match the layout formula for the opcode;
/// anything else is [`DecodeError::MalformedInstruction`].
pub fn deserialize_instruction(record: &InstructionRecord) -> Result<Instruction, DecodeError> {
    let opcode = Opcode::from_u64(record.opcode).ok_or(DecodeError::UnknownOpcode {
        opcode: record.opcode,
    })?;

    let expected = expected_fields(opcode, &record.fields)?;
    if record.fields.len() != expected {
        return Err(DecodeError::MalformedInstruction {
            opcode,
            expected,
            actual: record.fields.len(),
        });
    }

    let f = &record.fields;
    let prefix = opcode.layout().prefix;
    let tail = || f[prefix..].to_vec();

    let instr = match opcode {
        Opcode::Move => Instruction::mov(f[0], f[1]),
        Opcode::Ret => Instruction::ret(f[0]),
        Opcode::Fatal => Instruction::fatal(),
        Opcode::InvokePacked => Instruction::invoke_packed(f[0], f[2], tail()),
        Opcode::AllocTensor => Instruction::alloc_tensor(
            f[0],
            f[1],
            tail(),
            DataType::new(f[2], f[3], f[4]),
            f[7],
            f[5] != 0,
        ),
        Opcode::AllocTensorReg => Instruction::alloc_tensor_reg(
            f[0],
            f[1],
            f[2],
            DataType::new(f[3], f[4], f[5]),
            f[6],
            f[7] != 0,
        ),
        Opcode::AllocStorage => {
            Instruction::alloc_storage(f[0], f[1], DataType::new(f[2], f[3], f[4]), f[5], f[6], f[7])
        }
        Opcode::Free => Instruction::free(f[0]),
        Opcode::AllocTuple => Instruction::alloc_tuple(tail(), f[1]),
        Opcode::AllocClosure => Instruction::alloc_closure(f[0], tail(), f[2]),
        Opcode::SetShape => Instruction::set_shape(f[0], f[1], f[2]),
        Opcode::If => Instruction::if_(f[0], f[1], f[2], f[3]),
        Opcode::InvokeFunc => Instruction::invoke_func(f[0], tail(), f[2]),
        Opcode::InvokeClosure => Instruction::invoke_closure(f[0], tail(), f[2]),
        Opcode::LoadConst => Instruction::load_const(f[0], f[1]),
        Opcode::LoadConsti => Instruction::load_consti(f[0], f[1]),
        Opcode::GetField => Instruction::get_field(f[0], f[1], f[2]),
        Opcode::Goto => Instruction::goto(f[0]),
        Opcode::InvokeJit => Instruction::invoke_jit(f[0], f[2], tail()),
        Opcode::InferType => Instruction::infer_type(f[0], tail(), f[2]),
        Opcode::CudaSetStream => Instruction::cuda_set_stream(f[0], f[1]),
        Opcode::CudaAddEvent => Instruction::cuda_add_event(f[0], f[1]),
        Opcode::CudaWaitEvent => Instruction::cuda_wait_event(f[0], f[1]),
        Opcode::CudaStreamBarrier => Instruction::cuda_stream_barrier(),
    };
    Ok(instr)
}

/// Writes an instruction record to `w`.
pub fn write_record(w: &mut Writer, record: &InstructionRecord) {
    w.write_u64(record.opcode);
    w.write_u64(record.fields.len() as u64);
    for &field in &record.fields {
        w.write_i64(field);
    }
}

/// Reads an instruction record from `r`.
pub fn read_record(r: &mut Reader<'_>) -> Result<InstructionRecord, StreamError> {
    let opcode = r.read_u64()?;
    let count = r.read_u64()?;
    let count = usize::try_from(count).map_err(|_| StreamError::TruncatedStream)?;
    let fields = r.read_i64_vec(count)?;
    Ok(InstructionRecord { opcode, fields })
}

/// Writes `instr` as a record to `w`.
pub fn encode_instruction(w: &mut Writer, instr: &Instruction) {
    write_record(w, &serialize_instruction(instr));
}

/// Reads one instruction record from `r` and deserializes it.
pub fn decode_instruction(r: &mut Reader<'_>) -> Result<Instruction, DecodeError> {
    let record = read_record(r)?;
    deserialize_instruction(&record)
}
