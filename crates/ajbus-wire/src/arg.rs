//! Argument value views produced by unmarshalling and consumed by
//! marshalling.
//!
//! [`ArgView`] borrows from the [`crate::iobuf::IoBuf`] that produced it:
//! every method that advances the unmarshal cursor takes `&mut` on the
//! [`crate::message::Message`], so the borrow checker — not a runtime
//! check — enforces that an `ArgView` is invalidated the moment the next
//! argument is read. That mirrors the wire format's own rule that only one
//! argument's bytes are valid at a time.

use crate::types::TypeId;

/// A value unmarshalled from a message body. Scalars and strings borrow
/// directly from the buffer; `Array`/`Struct`/`DictEntry` are markers that
/// the caller must follow with [`crate::message::Message::open_container`]
/// to descend into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgView<'a> {
    /// `y`
    Byte(u8),
    /// `b`
    Bool(bool),
    /// `n`
    Int16(i16),
    /// `q`
    Uint16(u16),
    /// `i`
    Int32(i32),
    /// `u`
    Uint32(u32),
    /// `x`
    Int64(i64),
    /// `t`
    Uint64(u64),
    /// `d`
    Double(f64),
    /// `h`
    Handle(u32),
    /// `s`
    Str(&'a str),
    /// `o`
    ObjPath(&'a str),
    /// `g`
    Signature(&'a str),
    /// `v` — the inner value's signature; the caller reads the inner value
    /// with a follow-up unmarshal call, which consults this signature
    /// instead of the enclosing container's.
    Variant {
        /// Signature of exactly one complete type.
        inner_sig: &'a str,
    },
    /// An array whose element type is a scalar: the whole payload,
    /// already byte-order-corrected, as one contiguous slice the caller
    /// can cast per `elem`.
    ScalarArray {
        /// Element type; all elements are this type and `scalar_width()`
        /// bytes wide.
        elem: TypeId,
        /// The raw element bytes, `len() % elem.scalar_width() == 0`.
        bytes: &'a [u8],
    },
    /// An array whose elements are containers, strings, or variants: the
    /// caller must iterate with repeated unmarshal calls inside an opened
    /// container, bounded by the declared byte length.
    Array {
        /// Signature of the (single) element type.
        elem_sig: &'a str,
    },
    /// A struct open marker; fields follow via further unmarshal calls.
    Struct,
    /// A dict-entry open marker; exactly a key then a value follow.
    DictEntry,
}

impl<'a> ArgView<'a> {
    /// The [`TypeId`] this view was produced for.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        match self {
            ArgView::Byte(_) => TypeId::Byte,
            ArgView::Bool(_) => TypeId::Bool,
            ArgView::Int16(_) => TypeId::Int16,
            ArgView::Uint16(_) => TypeId::Uint16,
            ArgView::Int32(_) => TypeId::Int32,
            ArgView::Uint32(_) => TypeId::Uint32,
            ArgView::Int64(_) => TypeId::Int64,
            ArgView::Uint64(_) => TypeId::Uint64,
            ArgView::Double(_) => TypeId::Double,
            ArgView::Handle(_) => TypeId::Handle,
            ArgView::Str(_) => TypeId::String,
            ArgView::ObjPath(_) => TypeId::ObjPath,
            ArgView::Signature(_) => TypeId::Signature,
            ArgView::Variant { .. } => TypeId::Variant,
            ArgView::ScalarArray { .. } | ArgView::Array { .. } => TypeId::Array,
            ArgView::Struct => TypeId::Struct,
            ArgView::DictEntry => TypeId::DictEntry,
        }
    }
}

/// A value to marshal into a message body. Mirrors [`ArgView`] but owns or
/// borrows from the caller rather than from the buffer being written to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue<'a> {
    /// `y`
    Byte(u8),
    /// `b`
    Bool(bool),
    /// `n`
    Int16(i16),
    /// `q`
    Uint16(u16),
    /// `i`
    Int32(i32),
    /// `u`
    Uint32(u32),
    /// `x`
    Int64(i64),
    /// `t`
    Uint64(u64),
    /// `d`
    Double(f64),
    /// `h`
    Handle(u32),
    /// `s`
    Str(&'a str),
    /// `o`
    ObjPath(&'a str),
    /// `g`
    Signature(&'a str),
    /// `v`
    Variant {
        /// Signature of the value that follows.
        inner_sig: &'a str,
    },
    /// A scalar array, provided pre-packed in host byte order; the codec
    /// swaps to the message's declared order while copying.
    ScalarArray {
        /// Element type.
        elem: TypeId,
        /// Host-order element bytes.
        bytes: &'a [u8],
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_id_matches_variant() {
        assert_eq!(ArgView::Uint32(7).type_id(), TypeId::Uint32);
        assert_eq!(ArgView::Str("x").type_id(), TypeId::String);
        assert_eq!(ArgView::Variant { inner_sig: "i" }.type_id(), TypeId::Variant);
    }
}
