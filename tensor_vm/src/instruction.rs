// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tensor VM instruction set.
//!
//! Instructions are a closed tagged union over [`Opcode`] with per-variant
//! payloads. Variable-length payloads (shapes, argument lists, tuple fields,
//! free variables) are owned by the instruction; their lengths are the
//! counts that appear on the wire, so an instruction can never disagree with
//! its own tail.

use alloc::vec::Vec;
use core::fmt;

use crate::opcode::Opcode;

/// A signed integer naming a register in a function's register file.
pub type RegName = i64;

/// A signed 64-bit integer used for sizes, offsets, shape elements, and
/// function/constant indices.
pub type Index = i64;

/// A tensor element type, carried at wire width.
///
/// The triple mirrors `(code, bits, lanes)` of the runtime's data-type
/// descriptor; the codec does not interpret the values.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DataType {
    /// Type-class code (int/uint/float/...).
    pub code: Index,
    /// Bits per lane.
    pub bits: Index,
    /// Vector lane count.
    pub lanes: Index,
}

impl DataType {
    /// Creates a data type from its `(code, bits, lanes)` triple.
    #[must_use]
    pub const fn new(code: Index, bits: Index, lanes: Index) -> Self {
        Self { code, bits, lanes }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.code, self.bits, self.lanes)
    }
}

/// A single VM instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `from` into `dst`.
    Move {
        /// Source register.
        from: RegName,
        /// Destination register.
        dst: RegName,
    },
    /// Return `result` to the caller.
    Ret {
        /// Register holding the return value.
        result: RegName,
    },
    /// Abort execution.
    Fatal,
    /// Invoke a primitive kernel through the packed-function table.
    ///
    /// `args` covers both inputs and outputs; the last `output_size`
    /// registers are outputs.
    InvokePacked {
        /// Index into the primitive map.
        packed_index: Index,
        /// Number of trailing output registers in `args`.
        output_size: Index,
        /// Input and output registers (`arity` = length).
        args: Vec<RegName>,
    },
    /// Allocate a tensor with a compile-time shape into `dst`.
    AllocTensor {
        /// Register holding the backing storage.
        storage: RegName,
        /// Byte offset into the storage.
        offset: Index,
        /// Element type.
        dtype: DataType,
        /// Whether the tensor owns its memory.
        own: bool,
        /// Destination register.
        dst: RegName,
        /// Tensor shape (`ndim` = length).
        shape: Vec<Index>,
    },
    /// Allocate a tensor whose shape is computed at runtime.
    AllocTensorReg {
        /// Register holding the backing storage.
        storage: RegName,
        /// Byte offset into the storage.
        offset: Index,
        /// Register holding the shape tensor.
        shape_register: RegName,
        /// Element type.
        dtype: DataType,
        /// Destination register.
        dst: RegName,
        /// Whether the tensor owns its memory.
        own: bool,
    },
    /// Allocate a storage buffer into `dst`.
    AllocStorage {
        /// Allocation size in bytes.
        alloc_size: Index,
        /// Required alignment in bytes.
        alignment: Index,
        /// Element-type hint for the allocator.
        dtype: DataType,
        /// Device type code.
        device_type: Index,
        /// Device ordinal.
        device_id: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Release the memory held by a register.
    Free {
        /// Register whose memory is released.
        memory: RegName,
    },
    /// Allocate a tuple from field registers into `dst`.
    AllocTuple {
        /// Destination register.
        dst: RegName,
        /// Field registers (`num_fields` = length).
        fields: Vec<RegName>,
    },
    /// Allocate a closure over a VM function into `dst`.
    AllocClosure {
        /// Index of the captured function.
        func_index: Index,
        /// Destination register.
        dst: RegName,
        /// Captured free-variable registers (`num_free_vars` = length).
        free_vars: Vec<RegName>,
    },
    /// View `data` under the shape held in `shape`, writing to `dst`.
    SetShape {
        /// Register holding the source tensor.
        data: RegName,
        /// Register holding the new shape.
        shape: RegName,
        /// Destination register.
        dst: RegName,
    },
    /// Branch on the equality of `test` and `target`.
    If {
        /// Register under test.
        test: RegName,
        /// Register compared against.
        target: RegName,
        /// Relative pc offset taken on equality.
        true_offset: Index,
        /// Relative pc offset taken otherwise.
        false_offset: Index,
    },
    /// Invoke a VM function by index.
    InvokeFunc {
        /// Index into the function table.
        func_index: Index,
        /// Destination register.
        dst: RegName,
        /// Argument registers (`num_args` = length).
        args: Vec<RegName>,
    },
    /// Invoke a closure register.
    InvokeClosure {
        /// Register holding the closure.
        closure: RegName,
        /// Destination register.
        dst: RegName,
        /// Argument registers (`num_args` = length).
        args: Vec<RegName>,
    },
    /// Load a constant-pool entry into `dst`.
    LoadConst {
        /// Index into the constant pool.
        const_index: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Load an immediate integer into `dst`.
    LoadConsti {
        /// Immediate value.
        imm: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Project field `field_index` of the tuple in `object` into `dst`.
    GetField {
        /// Register holding the tuple.
        object: RegName,
        /// Field position.
        field_index: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Unconditional relative jump.
    Goto {
        /// Relative pc offset.
        pc_offset: Index,
    },
    /// Invoke a JIT-compiled op held in a register.
    ///
    /// `args` covers both inputs and outputs, like [`Instruction::InvokePacked`].
    InvokeJit {
        /// Register holding the op.
        op_reg: RegName,
        /// Number of trailing output registers in `args`.
        output_size: Index,
        /// Input and output registers (`arity` = length).
        args: Vec<RegName>,
    },
    /// Run type inference for the op held in `op_reg`.
    InferType {
        /// Register holding the op.
        op_reg: RegName,
        /// Destination register.
        dst: RegName,
        /// Argument registers (`num_args` = length).
        args: Vec<RegName>,
    },
    /// Select the current CUDA stream for a device.
    CudaSetStream {
        /// Device ordinal.
        device_id: Index,
        /// Stream identifier.
        stream_id: Index,
    },
    /// Record a CUDA event on a stream.
    CudaAddEvent {
        /// Event identifier.
        event_id: Index,
        /// Stream identifier.
        stream_id: Index,
    },
    /// Make a stream wait on a CUDA event.
    CudaWaitEvent {
        /// Event identifier.
        event_id: Index,
        /// Stream identifier.
        stream_id: Index,
    },
    /// Barrier across all CUDA streams.
    CudaStreamBarrier,
}

impl Instruction {
    /// `dst = from`.
    #[must_use]
    pub fn mov(from: RegName, dst: RegName) -> Self {
        Self::Move { from, dst }
    }

    /// Return `result`.
    #[must_use]
    pub fn ret(result: RegName) -> Self {
        Self::Ret { result }
    }

    /// Abort execution.
    #[must_use]
    pub fn fatal() -> Self {
        Self::Fatal
    }

    /// Invoke primitive `packed_index` over `args`.
    #[must_use]
    pub fn invoke_packed(packed_index: Index, output_size: Index, args: Vec<RegName>) -> Self {
        Self::InvokePacked {
            packed_index,
            output_size,
            args,
        }
    }

    /// Allocate a tensor of `shape` at `storage[offset]`.
    #[must_use]
    pub fn alloc_tensor(
        storage: RegName,
        offset: Index,
        shape: Vec<Index>,
        dtype: DataType,
        dst: RegName,
        own: bool,
    ) -> Self {
        Self::AllocTensor {
            storage,
            offset,
            dtype,
            own,
            dst,
            shape,
        }
    }

    /// Allocate a tensor whose shape lives in `shape_register`.
    #[must_use]
    pub fn alloc_tensor_reg(
        storage: RegName,
        offset: Index,
        shape_register: RegName,
        dtype: DataType,
        dst: RegName,
        own: bool,
    ) -> Self {
        Self::AllocTensorReg {
            storage,
            offset,
            shape_register,
            dtype,
            dst,
            own,
        }
    }

    /// Allocate `alloc_size` bytes of storage on `(device_type, device_id)`.
    #[must_use]
    pub fn alloc_storage(
        alloc_size: Index,
        alignment: Index,
        dtype: DataType,
        device_type: Index,
        device_id: Index,
        dst: RegName,
    ) -> Self {
        Self::AllocStorage {
            alloc_size,
            alignment,
            dtype,
            device_type,
            device_id,
            dst,
        }
    }

    /// Release the memory held by `memory`.
    #[must_use]
    pub fn free(memory: RegName) -> Self {
        Self::Free { memory }
    }

    /// Allocate a tuple of `fields`.
    #[must_use]
    pub fn alloc_tuple(fields: Vec<RegName>, dst: RegName) -> Self {
        Self::AllocTuple { dst, fields }
    }

    /// Allocate a closure over `func_index` capturing `free_vars`.
    #[must_use]
    pub fn alloc_closure(func_index: Index, free_vars: Vec<RegName>, dst: RegName) -> Self {
        Self::AllocClosure {
            func_index,
            dst,
            free_vars,
        }
    }

    /// Reshape `data` to the shape held in `shape`.
    #[must_use]
    pub fn set_shape(data: RegName, shape: RegName, dst: RegName) -> Self {
        Self::SetShape { data, shape, dst }
    }

    /// Branch to `true_offset` when `test` equals `target`, else to
    /// `false_offset`.
    #[must_use]
    pub fn if_(test: RegName, target: RegName, true_offset: Index, false_offset: Index) -> Self {
        Self::If {
            test,
            target,
            true_offset,
            false_offset,
        }
    }

    /// Invoke function `func_index` with `args`.
    #[must_use]
    pub fn invoke_func(func_index: Index, args: Vec<RegName>, dst: RegName) -> Self {
        Self::InvokeFunc {
            func_index,
            dst,
            args,
        }
    }

    /// Invoke the closure in `closure` with `args`.
    #[must_use]
    pub fn invoke_closure(closure: RegName, args: Vec<RegName>, dst: RegName) -> Self {
        Self::InvokeClosure { closure, dst, args }
    }

    /// Load constant `const_index` into `dst`.
    #[must_use]
    pub fn load_const(const_index: Index, dst: RegName) -> Self {
        Self::LoadConst { const_index, dst }
    }

    /// Load immediate `imm` into `dst`.
    #[must_use]
    pub fn load_consti(imm: Index, dst: RegName) -> Self {
        Self::LoadConsti { imm, dst }
    }

    /// Project field `field_index` of `object` into `dst`.
    #[must_use]
    pub fn get_field(object: RegName, field_index: Index, dst: RegName) -> Self {
        Self::GetField {
            object,
            field_index,
            dst,
        }
    }

    /// Jump by `pc_offset`.
    #[must_use]
    pub fn goto(pc_offset: Index) -> Self {
        Self::Goto { pc_offset }
    }

    /// Invoke the JIT-compiled op in `op_reg` over `args`.
    #[must_use]
    pub fn invoke_jit(op_reg: RegName, output_size: Index, args: Vec<RegName>) -> Self {
        Self::InvokeJit {
            op_reg,
            output_size,
            args,
        }
    }

    /// Infer the output type of the op in `op_reg` applied to `args`.
    #[must_use]
    pub fn infer_type(op_reg: RegName, args: Vec<RegName>, dst: RegName) -> Self {
        Self::InferType { op_reg, dst, args }
    }

    /// Select stream `stream_id` on device `device_id`.
    #[must_use]
    pub fn cuda_set_stream(device_id: Index, stream_id: Index) -> Self {
        Self::CudaSetStream {
            device_id,
            stream_id,
        }
    }

    /// Record event `event_id` on stream `stream_id`.
    #[must_use]
    pub fn cuda_add_event(event_id: Index, stream_id: Index) -> Self {
        Self::CudaAddEvent {
            event_id,
            stream_id,
        }
    }

    /// Make stream `stream_id` wait on event `event_id`.
    #[must_use]
    pub fn cuda_wait_event(event_id: Index, stream_id: Index) -> Self {
        Self::CudaWaitEvent {
            event_id,
            stream_id,
        }
    }

    /// Barrier across all CUDA streams.
    #[must_use]
    pub fn cuda_stream_barrier() -> Self {
        Self::CudaStreamBarrier
    }

    /// Returns the opcode of this instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Move { .. } => Opcode::Move,
            Self::Ret { .. } => Opcode::Ret,
            Self::Fatal => Opcode::Fatal,
            Self::InvokePacked { .. } => Opcode::InvokePacked,
            Self::AllocTensor { .. } => Opcode::AllocTensor,
            Self::AllocTensorReg { .. } => Opcode::AllocTensorReg,
            Self::AllocStorage { .. } => Opcode::AllocStorage,
            Self::Free { .. } => Opcode::Free,
            Self::AllocTuple { .. } => Opcode::AllocTuple,
            Self::AllocClosure { .. } => Opcode::AllocClosure,
            Self::SetShape { .. } => Opcode::SetShape,
            Self::If { .. } => Opcode::If,
            Self::InvokeFunc { .. } => Opcode::InvokeFunc,
            Self::InvokeClosure { .. } => Opcode::InvokeClosure,
            Self::LoadConst { .. } => Opcode::LoadConst,
            Self::LoadConsti { .. } => Opcode::LoadConsti,
            Self::GetField { .. } => Opcode::GetField,
            Self::Goto { .. } => Opcode::Goto,
            Self::InvokeJit { .. } => Opcode::InvokeJit,
            Self::InferType { .. } => Opcode::InferType,
            Self::CudaSetStream { .. } => Opcode::CudaSetStream,
            Self::CudaAddEvent { .. } => Opcode::CudaAddEvent,
            Self::CudaWaitEvent { .. } => Opcode::CudaWaitEvent,
            Self::CudaStreamBarrier => Opcode::CudaStreamBarrier,
        }
    }

    /// Returns the destination register, for instructions that write one.
    #[must_use]
    pub fn dst(&self) -> Option<RegName> {
        match self {
            Self::Move { dst, .. }
            | Self::AllocTensor { dst, .. }
            | Self::AllocTensorReg { dst, .. }
            | Self::AllocStorage { dst, .. }
            | Self::AllocTuple { dst, .. }
            | Self::AllocClosure { dst, .. }
            | Self::SetShape { dst, .. }
            | Self::InvokeFunc { dst, .. }
            | Self::InvokeClosure { dst, .. }
            | Self::LoadConst { dst, .. }
            | Self::LoadConsti { dst, .. }
            | Self::GetField { dst, .. }
            | Self::InferType { dst, .. } => Some(*dst),
            _ => None,
        }
    }
}

fn fmt_regs(f: &mut fmt::Formatter<'_>, regs: &[RegName]) -> fmt::Result {
    write!(f, "[")?;
    for (i, r) in regs.iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "${r}")?;
    }
    write!(f, "]")
}

fn fmt_shape(f: &mut fmt::Formatter<'_>, shape: &[Index]) -> fmt::Result {
    write!(f, "[")?;
    for (i, d) in shape.iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "{d}")?;
    }
    write!(f, "]")
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { from, dst } => write!(f, "move ${dst}, ${from}"),
            Self::Ret { result } => write!(f, "ret ${result}"),
            Self::Fatal => write!(f, "fatal"),
            Self::InvokePacked {
                packed_index,
                output_size,
                args,
            } => {
                write!(
                    f,
                    "invoke_packed packed={packed_index}, arity={}, out={output_size}, args=",
                    args.len()
                )?;
                fmt_regs(f, args)
            }
            Self::AllocTensor {
                storage,
                offset,
                dtype,
                own,
                dst,
                shape,
            } => {
                write!(
                    f,
                    "alloc_tensor ${dst}, storage=${storage}, offset={offset}, shape="
                )?;
                fmt_shape(f, shape)?;
                write!(f, ", dtype={dtype}, own={own}")
            }
            Self::AllocTensorReg {
                storage,
                offset,
                shape_register,
                dtype,
                dst,
                own,
            } => write!(
                f,
                "alloc_tensor_reg ${dst}, storage=${storage}, offset={offset}, \
                 shape=${shape_register}, dtype={dtype}, own={own}"
            ),
            Self::AllocStorage {
                alloc_size,
                alignment,
                dtype,
                device_type,
                device_id,
                dst,
            } => write!(
                f,
                "alloc_storage ${dst}, size={alloc_size}, align={alignment}, dtype={dtype}, \
                 device={device_type}:{device_id}"
            ),
            Self::Free { memory } => write!(f, "free ${memory}"),
            Self::AllocTuple { dst, fields } => {
                write!(f, "alloc_tuple ${dst}, fields=")?;
                fmt_regs(f, fields)
            }
            Self::AllocClosure {
                func_index,
                dst,
                free_vars,
            } => {
                write!(f, "alloc_closure ${dst}, func={func_index}, free_vars=")?;
                fmt_regs(f, free_vars)
            }
            Self::SetShape { data, shape, dst } => {
                write!(f, "set_shape ${dst}, data=${data}, shape=${shape}")
            }
            Self::If {
                test,
                target,
                true_offset,
                false_offset,
            } => write!(
                f,
                "if ${test} == ${target} then +{true_offset} else +{false_offset}"
            ),
            Self::InvokeFunc {
                func_index,
                dst,
                args,
            } => {
                write!(f, "invoke_func ${dst}, func={func_index}, args=")?;
                fmt_regs(f, args)
            }
            Self::InvokeClosure { closure, dst, args } => {
                write!(f, "invoke_closure ${dst}, closure=${closure}, args=")?;
                fmt_regs(f, args)
            }
            Self::LoadConst { const_index, dst } => {
                write!(f, "load_const ${dst}, const[{const_index}]")
            }
            Self::LoadConsti { imm, dst } => write!(f, "load_consti ${dst}, {imm}"),
            Self::GetField {
                object,
                field_index,
                dst,
            } => write!(f, "get_field ${dst}, ${object}[{field_index}]"),
            Self::Goto { pc_offset } => write!(f, "goto +{pc_offset}"),
            Self::InvokeJit {
                op_reg,
                output_size,
                args,
            } => {
                write!(
                    f,
                    "invoke_jit op=${op_reg}, arity={}, out={output_size}, args=",
                    args.len()
                )?;
                fmt_regs(f, args)
            }
            Self::InferType { op_reg, dst, args } => {
                write!(f, "infer_type ${dst}, op=${op_reg}, args=")?;
                fmt_regs(f, args)
            }
            Self::CudaSetStream {
                device_id,
                stream_id,
            } => write!(f, "cuda_set_stream device={device_id}, stream={stream_id}"),
            Self::CudaAddEvent {
                event_id,
                stream_id,
            } => write!(f, "cuda_add_event event={event_id}, stream={stream_id}"),
            Self::CudaWaitEvent {
                event_id,
                stream_id,
            } => write!(f, "cuda_wait_event event={event_id}, stream={stream_id}"),
            Self::CudaStreamBarrier => write!(f, "cuda_stream_barrier"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::vec;

    #[test]
    fn factories_set_the_expected_opcode() {
        assert_eq!(Instruction::mov(0, 1).opcode(), Opcode::Move);
        assert_eq!(Instruction::fatal().opcode(), Opcode::Fatal);
        assert_eq!(
            Instruction::invoke_packed(0, 1, vec![2]).opcode(),
            Opcode::InvokePacked
        );
        assert_eq!(
            Instruction::cuda_stream_barrier().opcode(),
            Opcode::CudaStreamBarrier
        );
    }

    #[test]
    fn dst_is_reported_only_where_present() {
        assert_eq!(Instruction::mov(0, 7).dst(), Some(7));
        assert_eq!(Instruction::load_consti(3, 4).dst(), Some(4));
        assert_eq!(Instruction::ret(0).dst(), None);
        assert_eq!(Instruction::goto(2).dst(), None);
        assert_eq!(Instruction::invoke_packed(0, 1, vec![1, 2]).dst(), None);
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(format!("{}", Instruction::ret(0)), "ret $0");
        assert_eq!(format!("{}", Instruction::mov(1, 2)), "move $2, $1");
        assert_eq!(
            format!(
                "{}",
                Instruction::alloc_tensor(2, 0, vec![4, 8], DataType::new(2, 32, 1), 5, true)
            ),
            "alloc_tensor $5, storage=$2, offset=0, shape=[4, 8], dtype=2:32:1, own=true"
        );
        assert_eq!(
            format!("{}", Instruction::if_(1, 2, 1, 4)),
            "if $1 == $2 then +1 else +4"
        );
    }
}
