//! The type-flag table and signature grammar.
//!
//! Every wire type is a single ASCII character. [`TypeId`] gives each one a
//! name and a static table answers alignment/category without a match
//! sprinkled through the codec. [`complete_type_len`] walks a signature
//! string and returns the length, in characters, of the first complete type
//! in it — the primitive the rest of the signature-cursor logic is built on.

use crate::errors::WireError;

/// One category per the alignment/category table: scalars copy by value,
/// strings carry a length prefix, variants carry a nested signature, and
/// containers (`ARRAY`, `STRUCT`, `DICT_ENTRY`) hold nested complete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Fixed-width values with no length prefix.
    Scalar,
    /// Length-prefixed (or NUL-terminated, for `SIGNATURE`) text.
    StringLike,
    /// Carries its own nested signature.
    Variant,
    /// Holds nested complete types: `ARRAY`, `STRUCT`, `DICT_ENTRY`.
    Container,
}

/// A single wire type character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    /// `y` — 8-bit unsigned byte.
    Byte,
    /// `b` — boolean, stored as a 4-byte word (0 or 1).
    Bool,
    /// `n` — 16-bit signed integer.
    Int16,
    /// `q` — 16-bit unsigned integer.
    Uint16,
    /// `i` — 32-bit signed integer.
    Int32,
    /// `u` — 32-bit unsigned integer.
    Uint32,
    /// `x` — 64-bit signed integer.
    Int64,
    /// `t` — 64-bit unsigned integer.
    Uint64,
    /// `d` — IEEE-754 double.
    Double,
    /// `h` — handle (file-descriptor-like index); carried as a `u32` index,
    /// no real descriptor passing.
    Handle,
    /// `s` — UTF-8 string, 4-byte length prefix, NUL-terminated.
    String,
    /// `o` — object path; same wire shape as `String`, additional path
    /// grammar constraints are a routing concern, not a wire one.
    ObjPath,
    /// `g` — type signature; 1-byte length prefix, NUL-terminated.
    Signature,
    /// `v` — variant: a `SIGNATURE` naming one complete type, followed by
    /// a value of that type.
    Variant,
    /// `a` — array: a `u32` byte length followed by that many bytes of
    /// homogeneous elements.
    Array,
    /// `(` — struct: 8-byte aligned, holds a fixed sequence of complete
    /// types with no length prefix of its own.
    Struct,
    /// `{` — dict-entry: 8-byte aligned, holds exactly one basic-type key
    /// and one complete-type value. Only legal as an array element.
    DictEntry,
}

impl TypeId {
    /// Maps a signature character to its [`TypeId`], or `None` if the byte
    /// is not a wire type character.
    #[must_use]
    pub fn from_char(c: u8) -> Option<Self> {
        Some(match c {
            b'y' => TypeId::Byte,
            b'b' => TypeId::Bool,
            b'n' => TypeId::Int16,
            b'q' => TypeId::Uint16,
            b'i' => TypeId::Int32,
            b'u' => TypeId::Uint32,
            b'x' => TypeId::Int64,
            b't' => TypeId::Uint64,
            b'd' => TypeId::Double,
            b'h' => TypeId::Handle,
            b's' => TypeId::String,
            b'o' => TypeId::ObjPath,
            b'g' => TypeId::Signature,
            b'v' => TypeId::Variant,
            b'a' => TypeId::Array,
            b'(' => TypeId::Struct,
            b'{' => TypeId::DictEntry,
            _ => return None,
        })
    }

    /// The signature character this type is written as.
    #[must_use]
    pub fn to_char(self) -> u8 {
        match self {
            TypeId::Byte => b'y',
            TypeId::Bool => b'b',
            TypeId::Int16 => b'n',
            TypeId::Uint16 => b'q',
            TypeId::Int32 => b'i',
            TypeId::Uint32 => b'u',
            TypeId::Int64 => b'x',
            TypeId::Uint64 => b't',
            TypeId::Double => b'd',
            TypeId::Handle => b'h',
            TypeId::String => b's',
            TypeId::ObjPath => b'o',
            TypeId::Signature => b'g',
            TypeId::Variant => b'v',
            TypeId::Array => b'a',
            TypeId::Struct => b'(',
            TypeId::DictEntry => b'{',
        }
    }

    /// Required alignment, in bytes, measured from the start of the
    /// enclosing buffer (message body or variant payload).
    #[must_use]
    pub fn alignment(self) -> usize {
        match self {
            TypeId::Byte | TypeId::Signature | TypeId::Variant => 1,
            TypeId::Int16 | TypeId::Uint16 => 2,
            TypeId::Bool
            | TypeId::Int32
            | TypeId::Uint32
            | TypeId::Handle
            | TypeId::String
            | TypeId::ObjPath
            | TypeId::Array => 4,
            TypeId::Int64 | TypeId::Uint64 | TypeId::Double | TypeId::Struct | TypeId::DictEntry => 8,
        }
    }

    /// Which [`Category`] this type belongs to.
    #[must_use]
    pub fn category(self) -> Category {
        match self {
            TypeId::Byte
            | TypeId::Bool
            | TypeId::Int16
            | TypeId::Uint16
            | TypeId::Int32
            | TypeId::Uint32
            | TypeId::Int64
            | TypeId::Uint64
            | TypeId::Double
            | TypeId::Handle => Category::Scalar,
            TypeId::String | TypeId::ObjPath | TypeId::Signature => Category::StringLike,
            TypeId::Variant => Category::Variant,
            TypeId::Array | TypeId::Struct | TypeId::DictEntry => Category::Container,
        }
    }

    /// Fixed wire width in bytes for scalar types; `None` for everything
    /// else (strings/containers/variants carry their own length).
    #[must_use]
    pub fn scalar_width(self) -> Option<usize> {
        match self {
            TypeId::Byte => Some(1),
            TypeId::Int16 | TypeId::Uint16 => Some(2),
            TypeId::Bool | TypeId::Int32 | TypeId::Uint32 | TypeId::Handle => Some(4),
            TypeId::Int64 | TypeId::Uint64 | TypeId::Double => Some(8),
            _ => None,
        }
    }

    /// True for the characters legal as a dict-entry key: any scalar or
    /// string-like type, never a variant or another container.
    #[must_use]
    pub fn is_basic(self) -> bool {
        matches!(self.category(), Category::Scalar | Category::StringLike)
    }
}

/// Returns the length, in bytes, of the first complete type described by
/// `sig`, or `None` if `sig` does not begin with a complete type (empty,
/// a bare close-bracket, or an unknown character).
///
/// A complete type is one signature character for scalars/strings/variant,
/// `a` followed by one complete type for arrays, a balanced `(...)` run for
/// structs, and `{` + one basic char + one complete type + `}` for
/// dict-entries.
#[must_use]
pub fn complete_type_len(sig: &[u8]) -> Option<usize> {
    let head = *sig.first()?;
    match head {
        b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g' | b'h' | b'v' => Some(1),
        b'a' => complete_type_len(&sig[1..]).map(|n| n + 1),
        b'(' => {
            let mut depth = 1usize;
            let mut i = 1usize;
            while i < sig.len() {
                match sig[i] {
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i + 1);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        b'{' => {
            let key = *sig.get(1)?;
            if TypeId::from_char(key).is_none_or(|t| !t.is_basic()) {
                return None;
            }
            let value_len = complete_type_len(&sig[2..])?;
            let close = 2 + value_len;
            if sig.get(close) == Some(&b'}') { Some(close + 1) } else { None }
        }
        _ => None,
    }
}

/// Validates that `sig` is a concatenation of zero or more complete types
/// with nothing left over (no dangling close-brackets, no unknown bytes).
#[must_use]
pub fn validate_signature(sig: &[u8]) -> bool {
    let mut rest = sig;
    while !rest.is_empty() {
        match complete_type_len(rest) {
            Some(n) => rest = &rest[n..],
            None => return false,
        }
    }
    true
}

/// Splits the first complete type off `sig`, returning `(head, rest)`.
pub fn split_first_type(sig: &[u8]) -> Result<(&[u8], &[u8]), WireError> {
    let n = complete_type_len(sig).ok_or(WireError::Signature)?;
    Ok((&sig[..n], &sig[n..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_are_one_char() {
        assert_eq!(complete_type_len(b"u"), Some(1));
        assert_eq!(complete_type_len(b"x rest"), Some(1));
    }

    #[test]
    fn array_of_array_of_struct() {
        assert_eq!(complete_type_len(b"aa(is)"), Some(6));
    }

    #[test]
    fn nested_struct_balances_parens() {
        assert_eq!(complete_type_len(b"(i(is)u)tail"), Some(8));
    }

    #[test]
    fn dict_entry_requires_basic_key() {
        assert_eq!(complete_type_len(b"{sv}"), Some(4));
        assert_eq!(complete_type_len(b"{(i)v}"), None);
    }

    #[test]
    fn unbalanced_struct_is_rejected() {
        assert_eq!(complete_type_len(b"(is"), None);
    }

    #[test]
    fn unknown_character_is_rejected() {
        assert_eq!(complete_type_len(b"z"), None);
    }

    #[test]
    fn validate_signature_accepts_empty() {
        assert!(validate_signature(b""));
        assert!(validate_signature(b"sua{sv}"));
        assert!(!validate_signature(b"su)"));
    }
}
