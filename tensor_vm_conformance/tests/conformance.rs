// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use tensor_vm::codec::{
    self, DecodeError as CodecError, deserialize_instruction, serialize_instruction,
};
use tensor_vm::executable::{
    BYTECODE_MAGIC, Executable, ExecutableBuilder, LoadError, RUNTIME_VERSION,
};
use tensor_vm::format::{DecodeError as StreamError, Writer};
use tensor_vm::function::{self, VMFunction};
use tensor_vm::instruction::{DataType, Instruction};
use tensor_vm::opcode::Opcode;
use tensor_vm::value::TextValueCodec;

type Exec = Executable<String>;

fn write_header(w: &mut Writer) {
    w.write_u64(BYTECODE_MAGIC);
    w.write_string(RUNTIME_VERSION);
}

/// An executable touching every opcode, with constants and primitives.
fn rich_executable() -> Exec {
    let dtype = DataType::new(2, 32, 1);
    let mut b = ExecutableBuilder::new();
    b.push_function(VMFunction::new(
        "main",
        vec!["x".to_string(), "y".to_string()],
        vec![
            Instruction::load_const(0, 2),
            Instruction::load_consti(-7, 3),
            Instruction::mov(3, 4),
            Instruction::alloc_storage(4096, 64, dtype, 2, 0, 5),
            Instruction::alloc_tensor(5, 0, vec![4, 8, 16], dtype, 6, true),
            Instruction::alloc_tensor_reg(5, 0, 3, dtype, 7, false),
            Instruction::invoke_packed(0, 1, vec![0, 1, 6]),
            Instruction::invoke_jit(2, 1, vec![0, 6]),
            Instruction::infer_type(2, vec![0, 1], 8),
            Instruction::set_shape(6, 3, 9),
            Instruction::alloc_tuple(vec![6, 9], 10),
            Instruction::get_field(10, 1, 11),
            Instruction::alloc_closure(1, vec![11], 12),
            Instruction::invoke_closure(12, vec![0], 13),
            Instruction::invoke_func(1, vec![13], 14),
            Instruction::if_(14, 3, 1, 2),
            Instruction::goto(2),
            Instruction::cuda_set_stream(0, 1),
            Instruction::cuda_add_event(0, 1),
            Instruction::cuda_wait_event(0, 1),
            Instruction::cuda_stream_barrier(),
            Instruction::free(5),
            Instruction::ret(14),
        ],
        15,
    ));
    b.push_function(VMFunction::new(
        "fail",
        vec![],
        vec![Instruction::fatal()],
        1,
    ));
    b.push_constant("tensor<4x8x16xf32>".to_string());
    b.push_constant("scalar<1.0>".to_string());
    b.push_primitive("vm.op.add");
    b.push_primitive("vm.op.matmul");
    b.finish(()).unwrap()
}

// Scenario 1: a hand-built stream with the right header and all-empty
// sections loads into an empty executable.
#[test]
fn header_discipline_empty_sections() {
    let mut w = Writer::new();
    write_header(&mut w);
    w.write_u64(0); // globals
    w.write_u64(0); // constants
    w.write_u64(0); // primitives
    w.write_u64(0); // functions
    let bytes = w.into_vec();

    let exec = Exec::load(bytes.clone(), (), &TextValueCodec).unwrap();
    assert!(exec.functions().is_empty());
    assert!(exec.constants().is_empty());
    assert_eq!(exec.num_globals(), 0);
    assert_eq!(exec.num_primitives(), 0);

    let stats = exec.stats();
    assert!(stats.contains("constants: #0"));
    assert!(stats.contains("globals (#0): []"));
    assert!(stats.contains("primitive ops (#0): []"));

    // The builder's save of an empty executable is the same stream.
    let empty = ExecutableBuilder::<String>::new().finish(()).unwrap();
    assert_eq!(empty.save(&TextValueCodec), bytes);
}

// Scenario 2: one flipped magic byte fails with BadMagic.
#[test]
fn bad_magic_is_rejected() {
    let mut w = Writer::new();
    write_header(&mut w);
    w.write_u64(0);
    w.write_u64(0);
    w.write_u64(0);
    w.write_u64(0);
    let mut bytes = w.into_vec();
    bytes[3] ^= 0x20;

    let err = Exec::load(bytes, (), &TextValueCodec).unwrap_err();
    assert_eq!(err, LoadError::Codec(CodecError::Stream(StreamError::BadMagic)));
}

// Scenario 3: single function, single instruction.
#[test]
fn single_function_single_instruction() {
    let mut b = ExecutableBuilder::<String>::new();
    b.push_function(VMFunction::new(
        "main",
        vec!["x".to_string()],
        vec![Instruction::ret(0)],
        1,
    ));
    let exec = b.finish(()).unwrap();

    let back = Exec::load(exec.save(&TextValueCodec), (), &TextValueCodec).unwrap();
    assert_eq!(back.function_arity("main").unwrap(), 1);
    assert_eq!(back.function_param_name("main", 0).unwrap(), "x");
    assert!(back.bytecode().contains("0: 1 0"));
}

// Scenario 4: AllocTensor field ordering survives a round trip, and a tail
// count that disagrees with the tail is rejected with the exact counts.
#[test]
fn alloc_tensor_ordering_and_corruption() {
    let instr = Instruction::alloc_tensor(2, 0, vec![4, 8, 16], DataType::new(2, 32, 1), 5, true);
    let record = serialize_instruction(&instr);
    assert_eq!(record.fields, vec![2, 0, 2, 32, 1, 1, 3, 5, 4, 8, 16]);
    assert_eq!(deserialize_instruction(&record).unwrap(), instr);

    let mut b = ExecutableBuilder::<String>::new();
    b.push_function(VMFunction::new("main", vec![], vec![instr], 6));
    let exec = b.finish(()).unwrap();
    let mut bytes = exec.save(&TextValueCodec);

    // The ndim field is the only 3-valued i64 in the stream; bump it to 4
    // while leaving the three shape entries in place.
    let ndim = 3u64.to_le_bytes();
    let hits: Vec<usize> = bytes
        .windows(8)
        .enumerate()
        .filter(|(_, win)| *win == ndim)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(hits.len(), 1);
    bytes[hits[0]] = 4;

    let err = Exec::load(bytes, (), &TextValueCodec).unwrap_err();
    assert_eq!(
        err,
        LoadError::Codec(CodecError::MalformedInstruction {
            opcode: Opcode::AllocTensor,
            expected: 12,
            actual: 11,
        })
    );
}

// Scenario 5: the global section is authoritative for indexing; the code
// section may store records in any order.
#[test]
fn global_indexing_beats_code_order() {
    let first = VMFunction::new("first", vec![], vec![Instruction::ret(0)], 1);
    let second = VMFunction::new(
        "second",
        vec!["a".to_string()],
        vec![Instruction::load_consti(1, 0), Instruction::ret(0)],
        1,
    );

    let mut w = Writer::new();
    write_header(&mut w);
    w.write_string_vec(&["first".to_string(), "second".to_string()]);
    w.write_u64(0); // constants
    w.write_u64(0); // primitives
    w.write_u64(2);
    function::encode_function(&mut w, &second);
    function::encode_function(&mut w, &first);

    let exec = Exec::load(w.into_vec(), (), &TextValueCodec).unwrap();
    assert_eq!(exec.functions()[0], first);
    assert_eq!(exec.functions()[1], second);
    for (name, &index) in exec.global_map() {
        assert_eq!(
            exec.functions()[usize::try_from(index).unwrap()].name,
            *name
        );
    }
}

// Scenario 6: InvokePacked with a variable tail encodes the documented
// record and decodes back to the same argument order.
#[test]
fn invoke_packed_variable_tail() {
    let instr = Instruction::invoke_packed(7, 2, vec![10, 11, 12, 13, 14]);
    let record = serialize_instruction(&instr);
    assert_eq!(record.fields.len(), 8);
    assert_eq!(record.fields, vec![7, 5, 2, 10, 11, 12, 13, 14]);

    match deserialize_instruction(&record).unwrap() {
        Instruction::InvokePacked {
            packed_index,
            output_size,
            args,
        } => {
            assert_eq!(packed_index, 7);
            assert_eq!(output_size, 2);
            assert_eq!(args, vec![10, 11, 12, 13, 14]);
        }
        other => panic!("unexpected instruction {other:?}"),
    }
}

#[test]
fn roundtrip_preserves_structure() {
    let exec = rich_executable();
    let back = Exec::load(exec.save(&TextValueCodec), (), &TextValueCodec).unwrap();

    assert_eq!(back.functions(), exec.functions());
    assert_eq!(back.global_map(), exec.global_map());
    assert_eq!(back.constants(), exec.constants());
    assert_eq!(back.primitive_map(), exec.primitive_map());
}

#[test]
fn save_is_bit_stable() {
    let exec = rich_executable();
    let first = exec.save(&TextValueCodec);
    let reloaded = Exec::load(first.clone(), (), &TextValueCodec).unwrap();
    assert_eq!(reloaded.save(&TextValueCodec), first);
}

#[test]
fn global_bijection_holds_after_load() {
    let exec = rich_executable();
    let back = Exec::load(exec.save(&TextValueCodec), (), &TextValueCodec).unwrap();

    assert_eq!(back.functions().len(), back.global_map().len());
    for (name, &index) in back.global_map() {
        assert_eq!(
            back.functions()[usize::try_from(index).unwrap()].name,
            *name
        );
    }
}

#[test]
fn primitive_indices_are_contiguous_after_load() {
    let exec = rich_executable();
    let back = Exec::load(exec.save(&TextValueCodec), (), &TextValueCodec).unwrap();

    let mut indices: Vec<i64> = back.primitive_map().values().copied().collect();
    indices.sort_unstable();
    let expected: Vec<i64> = (0..back.primitive_map().len() as i64).collect();
    assert_eq!(indices, expected);
}

#[test]
fn zero_instruction_function_roundtrips() {
    let mut b = ExecutableBuilder::<String>::new();
    b.push_function(VMFunction::new("noop", vec![], vec![], 0));
    let exec = b.finish(()).unwrap();

    let back = Exec::load(exec.save(&TextValueCodec), (), &TextValueCodec).unwrap();
    assert_eq!(back.function_arity("noop").unwrap(), 0);
    assert!(back.functions()[0].instructions.is_empty());

    let listing = back.bytecode();
    assert!(listing.contains("vm function[0]: noop()"));
    assert!(listing.contains("# instruction count = 0"));
}

#[test]
fn maximum_variable_tail_roundtrips() {
    let args: Vec<i64> = (0..1024).collect();
    let instr = Instruction::invoke_packed(3, 512, args.clone());

    let mut b = ExecutableBuilder::<String>::new();
    b.push_function(VMFunction::new("wide", vec![], vec![instr], 1024));
    let exec = b.finish(()).unwrap();

    let back = Exec::load(exec.save(&TextValueCodec), (), &TextValueCodec).unwrap();
    match &back.functions()[0].instructions[0] {
        Instruction::InvokePacked {
            args: loaded_args, ..
        } => assert_eq!(*loaded_args, args),
        other => panic!("unexpected instruction {other:?}"),
    }
}

#[test]
fn dangling_function_is_rejected() {
    let mut w = Writer::new();
    write_header(&mut w);
    w.write_string_vec(&["known".to_string()]);
    w.write_u64(0);
    w.write_u64(0);
    w.write_u64(1);
    function::encode_function(
        &mut w,
        &VMFunction::new("unknown", vec![], vec![Instruction::ret(0)], 1),
    );

    let err = Exec::load(w.into_vec(), (), &TextValueCodec).unwrap_err();
    assert_eq!(
        err,
        LoadError::DanglingFunction {
            name: "unknown".to_string()
        }
    );
}

#[test]
fn missing_function_is_rejected() {
    let mut w = Writer::new();
    write_header(&mut w);
    w.write_string_vec(&["a".to_string(), "b".to_string()]);
    w.write_u64(0);
    w.write_u64(0);
    w.write_u64(1);
    function::encode_function(&mut w, &VMFunction::new("a", vec![], vec![], 0));

    let err = Exec::load(w.into_vec(), (), &TextValueCodec).unwrap_err();
    assert_eq!(err, LoadError::MissingFunction { index: 1 });
}

#[test]
fn truncated_stream_is_rejected() {
    let exec = rich_executable();
    let bytes = exec.save(&TextValueCodec);
    for cut in [9, bytes.len() / 2, bytes.len() - 1] {
        let err = Exec::load(bytes[..cut].to_vec(), (), &TextValueCodec).unwrap_err();
        assert_eq!(
            err,
            LoadError::Codec(CodecError::Stream(StreamError::TruncatedStream)),
            "cut at {cut}"
        );
    }
}

#[test]
fn instruction_stream_codec_matches_record_codec() {
    let exec = rich_executable();
    for func in exec.functions() {
        let mut w = Writer::new();
        for instr in &func.instructions {
            codec::encode_instruction(&mut w, instr);
        }
        let mut r = tensor_vm::format::Reader::new(w.as_slice());
        for instr in &func.instructions {
            assert_eq!(&codec::decode_instruction(&mut r).unwrap(), instr);
        }
        assert_eq!(r.remaining(), 0);
    }
}
