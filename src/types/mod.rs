//! Type encoding and decoding for the binary wire format.
//!
//! Three traits cooperate:
//!
//! - [`PgType`] binds a Rust type to its PostgreSQL OID, consulting the
//!   [`OidMap`] for user-defined types.
//! - [`ToWireValue`] encodes a value as a binary parameter payload. The
//!   payload carries no length prefix of its own; the enclosing parameter
//!   descriptor, composite field, or array element supplies it, sized by
//!   [`ToWireValue::wire_size`].
//! - [`FromWireValue`] decodes a binary result cell, rejecting cells whose
//!   OID does not match.

mod array;
mod bytes;
mod composite;
mod primitives;
mod text;

#[cfg(feature = "with-chrono")]
mod chrono;

pub use array::{array_wire_size, parse_array, serialize_array};
pub use composite::{record_field_size, serialize_record_field, RecordReader};

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::types::Oid;

/// Binds a Rust type to its PostgreSQL type OID.
///
/// Built-in types return hard-coded OIDs; user-defined composite types are
/// looked up in the map by their registered name and fail with
/// [`Error::UnknownOid`] until registered.
pub trait PgType {
    /// OID of this type.
    fn oid(map: &OidMap) -> Result<Oid>;

    /// OID of the one-dimensional array type over this element type.
    fn array_oid(map: &OidMap) -> Result<Oid>;

    /// Accumulate the names of user-defined types reachable from this type
    /// that are not yet registered in the map.
    ///
    /// Walks composites field-by-field and arrays through their element
    /// type. If this reports nothing, serialization will only consult OIDs
    /// already present in the map.
    fn collect_new_udts(map: &OidMap, out: &mut Vec<&'static str>) {
        let _ = (map, out);
    }
}

/// Encodes a value as a binary parameter payload.
pub trait ToWireValue: PgType {
    /// Number of bytes [`ToWireValue::serialize`] will append, byte-for-byte.
    fn wire_size(&self, map: &OidMap) -> Result<usize>;

    /// Append the binary encoding of this value to `buf`.
    fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()>;

    /// True when this value is SQL NULL (`Option::None`).
    fn is_wire_null(&self) -> bool {
        false
    }
}

/// Decodes a binary result cell into a Rust type.
pub trait FromWireValue<'a>: Sized {
    /// Decode from a NULL cell.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from binary format bytes typed by the column OID.
    fn parse(map: &OidMap, oid: Oid, bytes: &'a [u8]) -> Result<Self>;
}

// === Option<T> - NULL handling ===

impl<T: PgType> PgType for Option<T> {
    fn oid(map: &OidMap) -> Result<Oid> {
        T::oid(map)
    }

    fn array_oid(map: &OidMap) -> Result<Oid> {
        T::array_oid(map)
    }

    fn collect_new_udts(map: &OidMap, out: &mut Vec<&'static str>) {
        T::collect_new_udts(map, out);
    }
}

impl<T: ToWireValue> ToWireValue for Option<T> {
    fn wire_size(&self, map: &OidMap) -> Result<usize> {
        match self {
            Some(v) => v.wire_size(map),
            None => Ok(0),
        }
    }

    fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Some(v) => v.serialize(map, buf),
            None => Ok(()),
        }
    }

    fn is_wire_null(&self) -> bool {
        self.is_none()
    }
}

impl<'a, T: FromWireValue<'a>> FromWireValue<'a> for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn parse(map: &OidMap, oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::parse(map, oid, bytes).map(Some)
    }
}

// === Reference support ===

impl<T: PgType + ?Sized> PgType for &T {
    fn oid(map: &OidMap) -> Result<Oid> {
        T::oid(map)
    }

    fn array_oid(map: &OidMap) -> Result<Oid> {
        T::array_oid(map)
    }

    fn collect_new_udts(map: &OidMap, out: &mut Vec<&'static str>) {
        T::collect_new_udts(map, out);
    }
}

impl<T: ToWireValue + ?Sized> ToWireValue for &T {
    fn wire_size(&self, map: &OidMap) -> Result<usize> {
        (**self).wire_size(map)
    }

    fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        (**self).serialize(map, buf)
    }

    fn is_wire_null(&self) -> bool {
        (**self).is_wire_null()
    }
}
