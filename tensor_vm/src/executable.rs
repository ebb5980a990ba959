// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The executable container: function table, constant pool, name maps, and
//! the save/load orchestration over them.
//!
//! An [`Executable`] is produced once by the compiler (via
//! [`ExecutableBuilder`]) or by [`Executable::load`], and is immutable
//! afterwards; interpreter threads may read it concurrently without
//! synchronization.
//!
//! The serialized stream is, in order: header (magic, version), global
//! section, constant section, primitive-name section, code section. The
//! global section's ordering is authoritative for function indexing: the
//! code section may store function records in any order, and each record is
//! placed at the index the global map assigns to its name.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write as _;

use crate::codec::DecodeError as CodecError;
use crate::disasm;
use crate::format::{DecodeError as StreamError, Reader, Writer};
use crate::function::{self, VMFunction};
use crate::instruction::Index;
use crate::value::ValueCodec;

/// Magic sentinel leading every serialized executable.
pub const BYTECODE_MAGIC: u64 = u64::from_le_bytes(*b"TENSORVM");

/// Version string written to and required from every serialized executable.
///
/// There is no version negotiation: load requires a byte-equal match.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// An error aborting [`Executable::load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// A section or instruction failed to decode.
    Codec(CodecError),
    /// The code section holds a function absent from the global map.
    DanglingFunction {
        /// Name of the unplaceable function.
        name: String,
    },
    /// A global name had no function body once the code section was read.
    MissingFunction {
        /// Function index left empty.
        index: usize,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "{e}"),
            Self::DanglingFunction { name } => {
                write!(f, "function '{name}' is not in the global map")
            }
            Self::MissingFunction { index } => {
                write!(f, "no function body for global index {index}")
            }
        }
    }
}

impl core::error::Error for LoadError {}

impl From<CodecError> for LoadError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<StreamError> for LoadError {
    fn from(e: StreamError) -> Self {
        Self::Codec(CodecError::Stream(e))
    }
}

/// An error from a read-only introspection query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryError {
    /// The named function does not exist.
    UnknownFunction {
        /// The unknown name.
        name: String,
    },
    /// An index was out of bounds.
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The valid length.
        len: usize,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction { name } => {
                write!(f, "cannot find function '{name}' in executable")
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
        }
    }
}

impl core::error::Error for QueryError {}

/// An error constructing an [`Executable`] through the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// Two functions share a name.
    DuplicateGlobal {
        /// The duplicated function name.
        name: String,
    },
    /// Two primitive ops share a name.
    DuplicatePrimitive {
        /// The duplicated primitive name.
        name: String,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateGlobal { name } => write!(f, "duplicate global function '{name}'"),
            Self::DuplicatePrimitive { name } => write!(f, "duplicate primitive op '{name}'"),
        }
    }
}

impl core::error::Error for BuildError {}

/// Builder assembling an [`Executable`] from compiler output.
///
/// Function index and primitive packed index are assigned by push order.
#[derive(Clone, Debug, Default)]
pub struct ExecutableBuilder<V> {
    functions: Vec<VMFunction>,
    constants: Vec<V>,
    primitives: Vec<String>,
}

impl<V> ExecutableBuilder<V> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            constants: Vec::new(),
            primitives: Vec::new(),
        }
    }

    /// Appends a function; its index is its push position.
    pub fn push_function(&mut self, func: VMFunction) -> Index {
        self.functions.push(func);
        (self.functions.len() - 1) as Index
    }

    /// Appends a constant; returns its pool index.
    pub fn push_constant(&mut self, value: V) -> Index {
        self.constants.push(value);
        (self.constants.len() - 1) as Index
    }

    /// Appends a primitive-op name; returns its packed index.
    pub fn push_primitive(&mut self, name: impl Into<String>) -> Index {
        self.primitives.push(name.into());
        (self.primitives.len() - 1) as Index
    }

    /// Finalizes the executable, attaching `host_module`.
    ///
    /// Fails if two functions or two primitives share a name.
    pub fn finish<M>(self, host_module: M) -> Result<Executable<V, M>, BuildError> {
        let mut global_map: BTreeMap<String, Index> = BTreeMap::new();
        for (i, func) in self.functions.iter().enumerate() {
            if global_map.insert(func.name.clone(), i as Index).is_some() {
                return Err(BuildError::DuplicateGlobal {
                    name: func.name.clone(),
                });
            }
        }

        let mut primitive_map: BTreeMap<String, Index> = BTreeMap::new();
        for (i, name) in self.primitives.iter().enumerate() {
            if primitive_map.insert(name.clone(), i as Index).is_some() {
                return Err(BuildError::DuplicatePrimitive { name: name.clone() });
            }
        }

        Ok(Executable {
            functions: self.functions,
            global_map,
            constants: self.constants,
            primitive_map,
            host_module,
            code: Vec::new(),
        })
    }
}

/// A loaded or freshly built VM executable.
///
/// `V` is the opaque constant-pool value type; `M` is the opaque host native
/// module carrying compiled kernels, stored but never interpreted here.
#[derive(Clone, Debug)]
pub struct Executable<V, M = ()> {
    functions: Vec<VMFunction>,
    global_map: BTreeMap<String, Index>,
    constants: Vec<V>,
    primitive_map: BTreeMap<String, Index>,
    host_module: M,
    code: Vec<u8>,
}

impl<V, M> Executable<V, M> {
    /// Returns the function table, in global-index order.
    #[must_use]
    pub fn functions(&self) -> &[VMFunction] {
        &self.functions
    }

    /// Returns the function-name to function-index map.
    #[must_use]
    pub fn global_map(&self) -> &BTreeMap<String, Index> {
        &self.global_map
    }

    /// Returns the constant pool.
    #[must_use]
    pub fn constants(&self) -> &[V] {
        &self.constants
    }

    /// Returns the primitive-op name to packed-index map.
    #[must_use]
    pub fn primitive_map(&self) -> &BTreeMap<String, Index> {
        &self.primitive_map
    }

    /// Returns the host native module.
    #[must_use]
    pub fn host_module(&self) -> &M {
        &self.host_module
    }

    /// Returns the serialized stream this executable was loaded from, if any.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Returns the number of global functions.
    #[must_use]
    pub fn num_globals(&self) -> usize {
        self.global_map.len()
    }

    /// Returns the global function name at `index`.
    pub fn global_name(&self, index: usize) -> Result<&str, QueryError> {
        self.functions
            .get(index)
            .map(|f| f.name.as_str())
            .ok_or(QueryError::IndexOutOfRange {
                index,
                len: self.functions.len(),
            })
    }

    /// Returns the number of primitive ops.
    #[must_use]
    pub fn num_primitives(&self) -> usize {
        self.primitive_map.len()
    }

    /// Returns the primitive-op name at packed index `index`.
    pub fn primitive_name(&self, index: usize) -> Result<&str, QueryError> {
        self.primitive_names()
            .get(index)
            .copied()
            .ok_or(QueryError::IndexOutOfRange {
                index,
                len: self.primitive_map.len(),
            })
    }

    /// Returns the arity of the named function.
    pub fn function_arity(&self, name: &str) -> Result<usize, QueryError> {
        Ok(self.function(name)?.arity())
    }

    /// Returns the `index`-th parameter name of the named function.
    pub fn function_param_name(&self, name: &str, index: usize) -> Result<&str, QueryError> {
        let func = self.function(name)?;
        func.params
            .get(index)
            .map(String::as_str)
            .ok_or(QueryError::IndexOutOfRange {
                index,
                len: func.params.len(),
            })
    }

    /// Renders the full disassembly listing.
    #[must_use]
    pub fn bytecode(&self) -> String {
        disasm::disassemble(&self.functions).to_string()
    }

    /// Renders counts and names of constants, globals, and primitive ops.
    #[must_use]
    pub fn stats(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "tensor vm executable statistics:");
        let _ = writeln!(out, "  constants: #{}", self.constants.len());

        let mut globals: Vec<(&str, Index)> = self
            .global_map
            .iter()
            .map(|(name, &i)| (name.as_str(), i))
            .collect();
        globals.sort_by_key(|&(_, i)| i);
        let _ = write!(out, "  globals (#{}): [", globals.len());
        for (n, (name, i)) in globals.iter().enumerate() {
            if n != 0 {
                let _ = write!(out, ", ");
            }
            let _ = write!(out, "(\"{name}\", {i})");
        }
        let _ = writeln!(out, "]");

        let primitives = self.primitive_names();
        let _ = write!(out, "  primitive ops (#{}): [", primitives.len());
        let _ = write!(out, "{}", primitives.join(", "));
        let _ = writeln!(out, "]");
        out
    }

    /// Serializes the executable.
    ///
    /// Output is deterministic: serializing, loading, and serializing again
    /// yields byte-equal streams.
    pub fn save<C>(&self, codec: &C) -> Vec<u8>
    where
        C: ValueCodec<Value = V>,
    {
        let mut w = Writer::new();

        // Header.
        w.write_u64(BYTECODE_MAGIC);
        w.write_string(RUNTIME_VERSION);

        // Global section: names only, sorted by index; the position on the
        // wire is the function index.
        let globals = self.global_names();
        w.write_u64(globals.len() as u64);
        for name in globals {
            w.write_string(name);
        }

        // Constant section.
        w.write_u64(self.constants.len() as u64);
        for value in &self.constants {
            codec.encode(value, &mut w);
        }

        // Primitive-name section: position is the packed index.
        let primitives = self.primitive_names();
        w.write_u64(primitives.len() as u64);
        for name in primitives {
            w.write_string(name);
        }

        // Code section.
        w.write_u64(self.functions.len() as u64);
        for func in &self.functions {
            function::encode_function(&mut w, func);
        }

        w.into_vec()
    }

    /// Loads an executable from `code`, attaching `host_module`.
    ///
    /// `code` is owned by the executable for its lifetime. No partially
    /// constructed executable is observable on failure.
    pub fn load<C>(code: Vec<u8>, host_module: M, codec: &C) -> Result<Self, LoadError>
    where
        C: ValueCodec<Value = V>,
    {
        let mut r = Reader::new(&code);

        // Header.
        if r.read_u64()? != BYTECODE_MAGIC {
            return Err(StreamError::BadMagic.into());
        }
        let version = r.read_string()?;
        if version != RUNTIME_VERSION {
            return Err(StreamError::VersionMismatch {
                expected: RUNTIME_VERSION.to_string(),
                found: version,
            }
            .into());
        }

        // Global section.
        let globals = r.read_string_vec()?;
        let mut global_map: BTreeMap<String, Index> = BTreeMap::new();
        for (i, name) in globals.into_iter().enumerate() {
            if global_map.insert(name, i as Index).is_some() {
                return Err(StreamError::MalformedSection { section: "global" }.into());
            }
        }

        // Constant section.
        let num_constants = r.read_u64()?;
        let num_constants =
            usize::try_from(num_constants).map_err(|_| StreamError::TruncatedStream)?;
        let mut constants = Vec::new();
        for _ in 0..num_constants {
            constants.push(codec.decode(&mut r)?);
        }

        // Primitive-name section.
        let primitives = r.read_string_vec()?;
        let mut primitive_map: BTreeMap<String, Index> = BTreeMap::new();
        for (i, name) in primitives.into_iter().enumerate() {
            if primitive_map.insert(name, i as Index).is_some() {
                return Err(StreamError::MalformedSection {
                    section: "primitive name",
                }
                .into());
            }
        }

        // Code section. Function records land at the index the global map
        // assigns to their name, not at their position in the section.
        let num_funcs = r.read_u64()?;
        let num_funcs = usize::try_from(num_funcs).map_err(|_| StreamError::TruncatedStream)?;
        if num_funcs > r.remaining() / 32 {
            // A function record is at least 32 bytes of header.
            return Err(StreamError::TruncatedStream.into());
        }

        let mut table: Vec<Option<VMFunction>> = vec![None; global_map.len()];
        for _ in 0..num_funcs {
            let func = function::decode_function(&mut r)?;
            let Some(&index) = global_map.get(&func.name) else {
                return Err(LoadError::DanglingFunction { name: func.name });
            };
            // Builder invariant: global indices are 0..len, so this in-bounds
            // conversion cannot fail for a map we populated above.
            let index =
                usize::try_from(index).map_err(|_| StreamError::MalformedSection {
                    section: "code",
                })?;
            table[index] = Some(func);
        }

        let functions = table
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(LoadError::MissingFunction { index }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            functions,
            global_map,
            constants,
            primitive_map,
            host_module,
            code,
        })
    }

    fn function(&self, name: &str) -> Result<&VMFunction, QueryError> {
        let &index = self
            .global_map
            .get(name)
            .ok_or_else(|| QueryError::UnknownFunction {
                name: name.to_string(),
            })?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.functions.get(i))
            .ok_or_else(|| QueryError::UnknownFunction {
                name: name.to_string(),
            })
    }

    /// Global names ordered by function index.
    fn global_names(&self) -> Vec<&str> {
        let mut pairs: Vec<(Index, &str)> = self
            .global_map
            .iter()
            .map(|(name, &i)| (i, name.as_str()))
            .collect();
        pairs.sort_unstable_by_key(|&(i, _)| i);
        pairs.into_iter().map(|(_, name)| name).collect()
    }

    /// Primitive names ordered by packed index.
    fn primitive_names(&self) -> Vec<&str> {
        let mut pairs: Vec<(Index, &str)> = self
            .primitive_map
            .iter()
            .map(|(name, &i)| (i, name.as_str()))
            .collect();
        pairs.sort_unstable_by_key(|&(i, _)| i);
        pairs.into_iter().map(|(_, name)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::value::TextValueCodec;

    fn two_function_exec() -> Executable<String> {
        let mut b = ExecutableBuilder::new();
        b.push_function(VMFunction::new(
            "main",
            vec!["x".to_string()],
            vec![Instruction::invoke_func(1, vec![0], 1), Instruction::ret(1)],
            2,
        ));
        b.push_function(VMFunction::new(
            "helper",
            vec!["a".to_string(), "b".to_string()],
            vec![Instruction::ret(0)],
            1,
        ));
        b.push_constant("const0".to_string());
        b.push_primitive("vm.op.add");
        b.finish(()).unwrap()
    }

    #[test]
    fn builder_assigns_indices_by_push_order() {
        let exec = two_function_exec();
        assert_eq!(exec.global_map()["main"], 0);
        assert_eq!(exec.global_map()["helper"], 1);
        assert_eq!(exec.primitive_map()["vm.op.add"], 0);
        assert_eq!(exec.num_globals(), 2);
        assert_eq!(exec.global_name(0).unwrap(), "main");
        assert_eq!(exec.global_name(1).unwrap(), "helper");
        assert_eq!(exec.primitive_name(0).unwrap(), "vm.op.add");
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let mut b: ExecutableBuilder<String> = ExecutableBuilder::new();
        b.push_function(VMFunction::new("f", vec![], vec![], 0));
        b.push_function(VMFunction::new("f", vec![], vec![], 0));
        assert_eq!(
            b.finish(()).unwrap_err(),
            BuildError::DuplicateGlobal { name: "f".into() }
        );

        let mut b: ExecutableBuilder<String> = ExecutableBuilder::new();
        b.push_primitive("p");
        b.push_primitive("p");
        assert_eq!(
            b.finish(()).unwrap_err(),
            BuildError::DuplicatePrimitive { name: "p".into() }
        );
    }

    #[test]
    fn save_load_roundtrip() {
        let exec = two_function_exec();
        let bytes = exec.save(&TextValueCodec);
        let back: Executable<String> =
            Executable::load(bytes.clone(), (), &TextValueCodec).unwrap();

        assert_eq!(back.functions(), exec.functions());
        assert_eq!(back.global_map(), exec.global_map());
        assert_eq!(back.constants(), exec.constants());
        assert_eq!(back.primitive_map(), exec.primitive_map());
        assert_eq!(back.code(), bytes.as_slice());
    }

    #[test]
    fn load_rejects_bad_magic() {
        let exec = two_function_exec();
        let mut bytes = exec.save(&TextValueCodec);
        bytes[0] ^= 0x01;
        let err = Executable::<String>::load(bytes, (), &TextValueCodec).unwrap_err();
        assert_eq!(err, LoadError::Codec(CodecError::Stream(StreamError::BadMagic)));
    }

    #[test]
    fn load_rejects_version_mismatch() {
        let mut w = Writer::new();
        w.write_u64(BYTECODE_MAGIC);
        w.write_string("0.0.0-other");
        let err = Executable::<String>::load(w.into_vec(), (), &TextValueCodec).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Codec(CodecError::Stream(StreamError::VersionMismatch { .. }))
        ));
    }

    #[test]
    fn introspection_queries() {
        let exec = two_function_exec();
        assert_eq!(exec.function_arity("main").unwrap(), 1);
        assert_eq!(exec.function_arity("helper").unwrap(), 2);
        assert_eq!(exec.function_param_name("helper", 1).unwrap(), "b");

        assert_eq!(
            exec.function_arity("nope"),
            Err(QueryError::UnknownFunction {
                name: "nope".into()
            })
        );
        assert_eq!(
            exec.function_param_name("main", 1),
            Err(QueryError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(
            exec.global_name(2),
            Err(QueryError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn stats_lists_counts_and_names() {
        let exec = two_function_exec();
        let stats = exec.stats();
        assert!(stats.contains("constants: #1"));
        assert!(stats.contains("globals (#2): [(\"main\", 0), (\"helper\", 1)]"));
        assert!(stats.contains("primitive ops (#1): [vm.op.add]"));
    }

    #[test]
    fn bytecode_lists_every_function() {
        let exec = two_function_exec();
        let text = exec.bytecode();
        assert!(text.contains("vm function[0]: main(x)"));
        assert!(text.contains("vm function[1]: helper(a, b)"));
    }
}
