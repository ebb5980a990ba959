// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance suite for the tensor VM executable format.
//!
//! All tests live in `tests/conformance.rs`.
