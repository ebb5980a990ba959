// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode values and per-opcode field layouts.
//!
//! Opcode discriminants are part of the wire contract and must never change.
//! [`FieldLayout`] is the single table that parameterizes both the encoder
//! and the decoder: the fixed prefix length and, for instructions with a
//! variable-length tail, the prefix position holding the tail count.

/// The discriminant of an instruction variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Opcode {
    /// Register-to-register move.
    Move = 0,
    /// Return a register to the caller.
    Ret = 1,
    /// Abort execution.
    Fatal = 2,
    /// Invoke a primitive kernel by packed index.
    InvokePacked = 3,
    /// Allocate a tensor with a static shape.
    AllocTensor = 4,
    /// Allocate a tensor whose shape lives in a register.
    AllocTensorReg = 5,
    /// Allocate a raw storage buffer.
    AllocStorage = 6,
    /// Free a storage or tensor register.
    Free = 7,
    /// Allocate a tuple from field registers.
    AllocTuple = 8,
    /// Allocate a closure capturing free variables.
    AllocClosure = 9,
    /// Reshape a tensor to a shape held in a register.
    SetShape = 10,
    /// Conditional branch on the equality of two registers.
    If = 11,
    /// Invoke a VM function by index.
    InvokeFunc = 12,
    /// Invoke a closure register.
    InvokeClosure = 13,
    /// Load a constant-pool value.
    LoadConst = 14,
    /// Load an immediate integer.
    LoadConsti = 15,
    /// Project a tuple field.
    GetField = 16,
    /// Unconditional relative jump.
    Goto = 17,
    /// Invoke a JIT-compiled op held in a register.
    InvokeJit = 18,
    /// Run type inference for an op held in a register.
    InferType = 19,
    /// Select the current CUDA stream.
    CudaSetStream = 20,
    /// Record a CUDA event on a stream.
    CudaAddEvent = 21,
    /// Make a stream wait on a CUDA event.
    CudaWaitEvent = 22,
    /// Barrier across all CUDA streams.
    CudaStreamBarrier = 23,
}

/// Per-opcode field layout shared by the encoder and decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Number of fields in the fixed prefix.
    pub prefix: usize,
    /// Prefix position of the count that sizes the variable tail, if any.
    pub tail_count_at: Option<usize>,
}

impl Opcode {
    /// All opcodes, in discriminant order.
    pub const ALL: [Self; 24] = [
        Self::Move,
        Self::Ret,
        Self::Fatal,
        Self::InvokePacked,
        Self::AllocTensor,
        Self::AllocTensorReg,
        Self::AllocStorage,
        Self::Free,
        Self::AllocTuple,
        Self::AllocClosure,
        Self::SetShape,
        Self::If,
        Self::InvokeFunc,
        Self::InvokeClosure,
        Self::LoadConst,
        Self::LoadConsti,
        Self::GetField,
        Self::Goto,
        Self::InvokeJit,
        Self::InferType,
        Self::CudaSetStream,
        Self::CudaAddEvent,
        Self::CudaWaitEvent,
        Self::CudaStreamBarrier,
    ];

    /// Returns the wire discriminant.
    #[must_use]
    pub const fn code(self) -> u64 {
        self as u64
    }

    /// Parses an opcode from its wire discriminant.
    #[must_use]
    pub fn from_u64(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Move),
            1 => Some(Self::Ret),
            2 => Some(Self::Fatal),
            3 => Some(Self::InvokePacked),
            4 => Some(Self::AllocTensor),
            5 => Some(Self::AllocTensorReg),
            6 => Some(Self::AllocStorage),
            7 => Some(Self::Free),
            8 => Some(Self::AllocTuple),
            9 => Some(Self::AllocClosure),
            10 => Some(Self::SetShape),
            11 => Some(Self::If),
            12 => Some(Self::InvokeFunc),
            13 => Some(Self::InvokeClosure),
            14 => Some(Self::LoadConst),
            15 => Some(Self::LoadConsti),
            16 => Some(Self::GetField),
            17 => Some(Self::Goto),
            18 => Some(Self::InvokeJit),
            19 => Some(Self::InferType),
            20 => Some(Self::CudaSetStream),
            21 => Some(Self::CudaAddEvent),
            22 => Some(Self::CudaWaitEvent),
            23 => Some(Self::CudaStreamBarrier),
            _ => None,
        }
    }

    /// Returns the mnemonic used by the disassembler.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Ret => "ret",
            Self::Fatal => "fatal",
            Self::InvokePacked => "invoke_packed",
            Self::AllocTensor => "alloc_tensor",
            Self::AllocTensorReg => "alloc_tensor_reg",
            Self::AllocStorage => "alloc_storage",
            Self::Free => "free",
            Self::AllocTuple => "alloc_tuple",
            Self::AllocClosure => "alloc_closure",
            Self::SetShape => "set_shape",
            Self::If => "if",
            Self::InvokeFunc => "invoke_func",
            Self::InvokeClosure => "invoke_closure",
            Self::LoadConst => "load_const",
            Self::LoadConsti => "load_consti",
            Self::GetField => "get_field",
            Self::Goto => "goto",
            Self::InvokeJit => "invoke_jit",
            Self::InferType => "infer_type",
            Self::CudaSetStream => "cuda_set_stream",
            Self::CudaAddEvent => "cuda_add_event",
            Self::CudaWaitEvent => "cuda_wait_event",
            Self::CudaStreamBarrier => "cuda_stream_barrier",
        }
    }

    /// Returns the field layout for this opcode.
    ///
    /// The count that sizes a variable tail always lives inside the fixed
    /// prefix, so a single forward pass can parse any instruction.
    #[must_use]
    pub const fn layout(self) -> FieldLayout {
        const fn fixed(prefix: usize) -> FieldLayout {
            FieldLayout {
                prefix,
                tail_count_at: None,
            }
        }
        const fn tailed(prefix: usize, tail_count_at: usize) -> FieldLayout {
            FieldLayout {
                prefix,
                tail_count_at: Some(tail_count_at),
            }
        }

        match self {
            Self::Move => fixed(2),
            Self::Ret => fixed(1),
            Self::Fatal => fixed(0),
            Self::InvokePacked => tailed(3, 1),
            Self::AllocTensor => tailed(8, 6),
            Self::AllocTensorReg => fixed(8),
            Self::AllocStorage => fixed(8),
            Self::Free => fixed(1),
            Self::AllocTuple => tailed(2, 0),
            Self::AllocClosure => tailed(3, 1),
            Self::SetShape => fixed(3),
            Self::If => fixed(4),
            Self::InvokeFunc => tailed(3, 1),
            Self::InvokeClosure => tailed(3, 1),
            Self::LoadConst => fixed(2),
            Self::LoadConsti => fixed(2),
            Self::GetField => fixed(3),
            Self::Goto => fixed(1),
            Self::InvokeJit => tailed(3, 1),
            Self::InferType => tailed(3, 1),
            Self::CudaSetStream => fixed(2),
            Self::CudaAddEvent => fixed(2),
            Self::CudaWaitEvent => fixed(2),
            Self::CudaStreamBarrier => fixed(0),
        }
    }
}
