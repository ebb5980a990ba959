// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Constant-value serialization seam.
//!
//! The executable treats constant-pool values as opaque: tensor and scalar
//! serialization belongs to the runtime's value layer, injected here as a
//! [`ValueCodec`]. The only contract the container imposes is that
//! `decode(encode(v))` yields a value equal to `v` under the value domain's
//! own notion of equality.

use alloc::string::String;

use crate::format::{DecodeError, Reader, Writer};

/// Serializer/deserializer for constant-pool values.
pub trait ValueCodec {
    /// The value type held in the constant pool.
    type Value;

    /// Encodes `value` onto `w`.
    fn encode(&self, value: &Self::Value, w: &mut Writer);

    /// Decodes one value from `r`.
    fn decode(&self, r: &mut Reader<'_>) -> Result<Self::Value, DecodeError>;
}

/// A minimal [`ValueCodec`] over UTF-8 strings.
///
/// Useful for tooling and tests that exercise the container format without a
/// tensor runtime; values are length-prefixed like every other string in the
/// format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TextValueCodec;

impl ValueCodec for TextValueCodec {
    type Value = String;

    fn encode(&self, value: &Self::Value, w: &mut Writer) {
        w.write_string(value);
    }

    fn decode(&self, r: &mut Reader<'_>) -> Result<Self::Value, DecodeError> {
        r.read_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn text_codec_roundtrips() {
        let codec = TextValueCodec;
        let mut w = Writer::new();
        codec.encode(&"tensor<4x8xf32>".to_string(), &mut w);
        codec.encode(&String::new(), &mut w);

        let mut r = Reader::new(w.as_slice());
        assert_eq!(codec.decode(&mut r).unwrap(), "tensor<4x8xf32>");
        assert_eq!(codec.decode(&mut r).unwrap(), "");
        assert_eq!(r.remaining(), 0);
    }
}
