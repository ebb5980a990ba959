// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for the tensor VM executable codec.
//!
//! All benches live in `benches/executable.rs`.
