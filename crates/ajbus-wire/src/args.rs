//! Variadic basic-type convenience on top of [`Message::unmarshal_arg`]/
//! [`Message::marshal_arg`].
//!
//! The original exposes this as C variadic functions, `UnmarshalArgs(msg,
//! sig, ...)`/`MarshalArgs(msg, sig, ...)`, where each `...` pointer's type
//! is implied positionally by the matching character of `sig`. Rust has no
//! argument-count polymorphism, so this re-expresses the same contract as a
//! small tag-dispatched enumeration of argument shapes instead: basic types
//! only (no containers, no variants), and each requested type must exactly
//! match the message's actual argument type or the whole call fails with
//! [`WireError::Unmarshal`], leaving the slots filled so far untouched by
//! the failing one.

use std::time::Duration;

use crate::errors::WireError;
use crate::iobuf::Transport;
use crate::message::Message;
use crate::types::TypeId;
use crate::ArgView;

/// A single basic-typed destination for [`unmarshal_args`]. String-like
/// slots borrow from the message's own buffer (`'buf`), exactly like
/// [`ArgView`] itself; scalar slots just write through.
#[derive(Debug)]
pub enum BasicSlot<'a, 'buf> {
    /// `y`
    Byte(&'a mut u8),
    /// `b`
    Bool(&'a mut bool),
    /// `n`
    Int16(&'a mut i16),
    /// `q`
    Uint16(&'a mut u16),
    /// `i`
    Int32(&'a mut i32),
    /// `u`
    Uint32(&'a mut u32),
    /// `x`
    Int64(&'a mut i64),
    /// `t`
    Uint64(&'a mut u64),
    /// `d`
    Double(&'a mut f64),
    /// `h`
    Handle(&'a mut u32),
    /// `s`
    Str(&'a mut Option<&'buf str>),
    /// `o`
    ObjPath(&'a mut Option<&'buf str>),
    /// `g`
    Signature(&'a mut Option<&'buf str>),
}

impl BasicSlot<'_, '_> {
    fn type_id(&self) -> TypeId {
        match self {
            BasicSlot::Byte(_) => TypeId::Byte,
            BasicSlot::Bool(_) => TypeId::Bool,
            BasicSlot::Int16(_) => TypeId::Int16,
            BasicSlot::Uint16(_) => TypeId::Uint16,
            BasicSlot::Int32(_) => TypeId::Int32,
            BasicSlot::Uint32(_) => TypeId::Uint32,
            BasicSlot::Int64(_) => TypeId::Int64,
            BasicSlot::Uint64(_) => TypeId::Uint64,
            BasicSlot::Double(_) => TypeId::Double,
            BasicSlot::Handle(_) => TypeId::Handle,
            BasicSlot::Str(_) => TypeId::String,
            BasicSlot::ObjPath(_) => TypeId::ObjPath,
            BasicSlot::Signature(_) => TypeId::Signature,
        }
    }
}

/// A single basic-typed value to write for [`marshal_args`].
#[derive(Debug, Clone, Copy)]
pub enum BasicValue<'a> {
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
}

impl BasicValue<'_> {
    fn type_id(self) -> TypeId {
        match self {
            BasicValue::Byte(_) => TypeId::Byte,
            BasicValue::Bool(_) => TypeId::Bool,
            BasicValue::Int16(_) => TypeId::Int16,
            BasicValue::Uint16(_) => TypeId::Uint16,
            BasicValue::Int32(_) => TypeId::Int32,
            BasicValue::Uint32(_) => TypeId::Uint32,
            BasicValue::Int64(_) => TypeId::Int64,
            BasicValue::Uint64(_) => TypeId::Uint64,
            BasicValue::Double(_) => TypeId::Double,
            BasicValue::Handle(_) => TypeId::Handle,
            BasicValue::Str(_) => TypeId::String,
            BasicValue::ObjPath(_) => TypeId::ObjPath,
            BasicValue::Signature(_) => TypeId::Signature,
        }
    }
}

/// Reads `slots.len()` basic arguments off `msg`, one per character of
/// `sig`. Each slot's own tag must already agree with the matching `sig`
/// character (a caller contract, checked up front as [`WireError::Signature`]
/// rather than [`WireError::Unmarshal`] since it never depends on anything
/// read off the wire); the message's *actual* argument type is then checked
/// against that request one argument at a time, and the first mismatch
/// fails the whole call with [`WireError::Unmarshal`] without consuming
/// arguments past it.
///
/// # Errors
///
/// [`WireError::Signature`] if `sig` and `slots` disagree in length or
/// basic-ness, [`WireError::Unmarshal`] if the message's actual argument
/// type doesn't match what was requested, or any error
/// [`Message::unmarshal_arg`] itself can return.
pub fn unmarshal_args<'buf>(
    msg: &mut Message<'buf>,
    sig: &str,
    slots: &mut [BasicSlot<'_, 'buf>],
    transport: &mut dyn Transport,
    timeout: Duration,
) -> Result<(), WireError> {
    if sig.len() != slots.len() {
        return Err(WireError::Signature);
    }
    for (ch, slot) in sig.bytes().zip(slots.iter_mut()) {
        let requested = TypeId::from_char(ch).filter(|t| t.is_basic()).ok_or(WireError::Signature)?;
        if slot.type_id() != requested {
            return Err(WireError::Signature);
        }
        let view = msg.unmarshal_arg(transport, timeout)?;
        fill_slot(slot, view)?;
    }
    Ok(())
}

fn fill_slot(slot: &mut BasicSlot<'_, '_>, view: ArgView<'_>) -> Result<(), WireError> {
    match (slot, view) {
        (BasicSlot::Byte(dst), ArgView::Byte(v)) => **dst = v,
        (BasicSlot::Bool(dst), ArgView::Bool(v)) => **dst = v,
        (BasicSlot::Int16(dst), ArgView::Int16(v)) => **dst = v,
        (BasicSlot::Uint16(dst), ArgView::Uint16(v)) => **dst = v,
        (BasicSlot::Int32(dst), ArgView::Int32(v)) => **dst = v,
        (BasicSlot::Uint32(dst), ArgView::Uint32(v)) => **dst = v,
        (BasicSlot::Int64(dst), ArgView::Int64(v)) => **dst = v,
        (BasicSlot::Uint64(dst), ArgView::Uint64(v)) => **dst = v,
        (BasicSlot::Double(dst), ArgView::Double(v)) => **dst = v,
        (BasicSlot::Handle(dst), ArgView::Handle(v)) => **dst = v,
        // SAFETY note for reviewers, not the compiler: `view` borrows from
        // the same buffer `'buf` that `dst`'s `Option<&'buf str>` does, so
        // this assignment doesn't extend any lifetime.
        (BasicSlot::Str(dst), ArgView::Str(v)) => **dst = Some(v),
        (BasicSlot::ObjPath(dst), ArgView::ObjPath(v)) => **dst = Some(v),
        (BasicSlot::Signature(dst), ArgView::Signature(v)) => **dst = Some(v),
        _ => return Err(WireError::Unmarshal),
    }
    Ok(())
}

/// Writes `values.len()` basic arguments into `msg`, one per character of
/// `sig`, failing the same way [`unmarshal_args`] does if `sig` and
/// `values` disagree.
///
/// # Errors
///
/// [`WireError::Signature`] if `sig` and `values` disagree in length or
/// basic-ness, or any error [`Message::marshal_arg`] itself can return.
pub fn marshal_args(msg: &mut Message<'_>, sig: &str, values: &[BasicValue<'_>]) -> Result<(), WireError> {
    if sig.len() != values.len() {
        return Err(WireError::Signature);
    }
    for (ch, value) in sig.bytes().zip(values.iter().copied()) {
        let requested = TypeId::from_char(ch).filter(|t| t.is_basic()).ok_or(WireError::Signature)?;
        if value.type_id() != requested {
            return Err(WireError::Signature);
        }
        let arg = match value {
            BasicValue::Byte(v) => crate::ArgValue::Byte(v),
            BasicValue::Bool(v) => crate::ArgValue::Bool(v),
            BasicValue::Int16(v) => crate::ArgValue::Int16(v),
            BasicValue::Uint16(v) => crate::ArgValue::Uint16(v),
            BasicValue::Int32(v) => crate::ArgValue::Int32(v),
            BasicValue::Uint32(v) => crate::ArgValue::Uint32(v),
            BasicValue::Int64(v) => crate::ArgValue::Int64(v),
            BasicValue::Uint64(v) => crate::ArgValue::Uint64(v),
            BasicValue::Double(v) => crate::ArgValue::Double(v),
            BasicValue::Handle(v) => crate::ArgValue::Handle(v),
            BasicValue::Str(v) => crate::ArgValue::Str(v),
            BasicValue::ObjPath(v) => crate::ArgValue::ObjPath(v),
            BasicValue::Signature(v) => crate::ArgValue::Signature(v),
        };
        msg.marshal_arg(arg)?;
    }
    Ok(())
}
