//! Composite (record) encoding: anonymous tuples and user-defined types.
//!
//! Wire layout: `i32 nfields`, then per field `i32 field_oid, i32 length,
//! bytes`. Tuples encode as anonymous records; named composite types get
//! their traits from the [`composite_type!`](crate::composite_type) macro
//! and resolve their OID through the [`OidMap`].

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::codec::read_i32;
use crate::protocol::types::{oid, Oid};

use super::{FromWireValue, PgType, ToWireValue};

/// Size of one encoded record field: OID + length header + payload.
pub fn record_field_size<T: ToWireValue + ?Sized>(map: &OidMap, value: &T) -> Result<usize> {
    Ok(8 + value.wire_size(map)?)
}

/// Append one record field: `i32 field_oid, i32 length, bytes`.
pub fn serialize_record_field<T: ToWireValue>(
    map: &OidMap,
    value: &T,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let field_oid = T::oid(map)?;
    let len = value.wire_size(map)?;
    if len > i32::MAX as usize {
        return Err(Error::SizeOverflow);
    }
    buf.extend_from_slice(&field_oid.to_be_bytes());
    buf.extend_from_slice(&(len as i32).to_be_bytes());
    value.serialize(map, buf)
}

/// Sequential reader over an encoded record's fields.
pub struct RecordReader<'a> {
    data: &'a [u8],
}

impl<'a> RecordReader<'a> {
    /// Validate the field count header and position at the first field.
    pub fn new(bytes: &'a [u8], expected_fields: usize) -> Result<Self> {
        let (nfields, data) = read_i32(bytes)?;
        if nfields as usize != expected_fields {
            return Err(Error::Decode(format!(
                "record has {} fields, expected {}",
                nfields, expected_fields
            )));
        }
        Ok(Self { data })
    }

    /// Decode the next field.
    pub fn field<T: FromWireValue<'a>>(&mut self, map: &OidMap) -> Result<T> {
        let (field_oid, rest) = read_i32(self.data)?;
        let (len, rest) = read_i32(rest)?;
        if len < 0 {
            self.data = rest;
            return T::from_null();
        }
        let len = len as usize;
        if rest.len() < len {
            return Err(Error::Decode("truncated record field".into()));
        }
        let value = T::parse(map, field_oid as Oid, &rest[..len])?;
        self.data = &rest[len..];
        Ok(value)
    }

    /// Check that every field was consumed.
    pub fn finish(self) -> Result<()> {
        if !self.data.is_empty() {
            return Err(Error::Decode("trailing bytes after record fields".into()));
        }
        Ok(())
    }
}

// === Tuples as anonymous records ===

macro_rules! impl_record_for_tuple {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: PgType),+> PgType for ($($T,)+) {
            fn oid(_map: &OidMap) -> Result<Oid> {
                Ok(oid::RECORD)
            }

            fn array_oid(_map: &OidMap) -> Result<Oid> {
                Err(Error::Unsupported("arrays of anonymous records".into()))
            }

            fn collect_new_udts(map: &OidMap, out: &mut Vec<&'static str>) {
                $($T::collect_new_udts(map, out);)+
            }
        }

        impl<$($T: ToWireValue),+> ToWireValue for ($($T,)+) {
            fn wire_size(&self, map: &OidMap) -> Result<usize> {
                let mut size = 4_usize;
                $(size += record_field_size(map, &self.$idx)?;)+
                Ok(size)
            }

            fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
                buf.extend_from_slice(&($count as i32).to_be_bytes());
                $(serialize_record_field(map, &self.$idx, buf)?;)+
                Ok(())
            }
        }

        impl<'a, $($T: FromWireValue<'a>),+> FromWireValue<'a> for ($($T,)+) {
            // The outer OID is not checked: an anonymous tuple may decode a
            // record of any named composite type.
            fn parse(map: &OidMap, _oid: Oid, bytes: &'a [u8]) -> Result<Self> {
                let mut reader = RecordReader::new(bytes, $count)?;
                let value = ($(reader.field::<$T>(map)?,)+);
                reader.finish()?;
                Ok(value)
            }
        }
    };
}

impl_record_for_tuple!(1, 0: T0);
impl_record_for_tuple!(2, 0: T0, 1: T1);
impl_record_for_tuple!(3, 0: T0, 1: T1, 2: T2);
impl_record_for_tuple!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_record_for_tuple!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_record_for_tuple!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_record_for_tuple!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_record_for_tuple!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);

/// Implements the wire traits for a user-defined composite type.
///
/// The struct's fields are encoded in the order they are listed, which must
/// match the order of the attributes in the server's `CREATE TYPE`. The
/// type's OID is resolved at runtime through the connection's [`OidMap`];
/// unregistered names are reported by `collect_new_udts` so the connection
/// can look them up before first use.
///
/// ```ignore
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// duplex_postgres::composite_type!(Point, "point_xy", { x: i32, y: i32 });
/// ```
#[macro_export]
macro_rules! composite_type {
    ($ty:ident, $pg_name:literal, { $($field:ident: $fty:ty),+ $(,)? }) => {
        impl $crate::types::PgType for $ty {
            fn oid(
                map: &$crate::OidMap,
            ) -> $crate::Result<$crate::protocol::types::Oid> {
                map.oid_of($pg_name)
            }

            fn array_oid(
                map: &$crate::OidMap,
            ) -> $crate::Result<$crate::protocol::types::Oid> {
                map.array_oid_of($pg_name)
            }

            fn collect_new_udts(map: &$crate::OidMap, out: &mut Vec<&'static str>) {
                if !map.contains($pg_name) && !out.contains(&$pg_name) {
                    out.push($pg_name);
                }
                $(<$fty as $crate::types::PgType>::collect_new_udts(map, out);)+
            }
        }

        impl $crate::types::ToWireValue for $ty {
            fn wire_size(&self, map: &$crate::OidMap) -> $crate::Result<usize> {
                let mut size = 4_usize;
                $(size += $crate::types::record_field_size(map, &self.$field)?;)+
                Ok(size)
            }

            fn serialize(
                &self,
                map: &$crate::OidMap,
                buf: &mut Vec<u8>,
            ) -> $crate::Result<()> {
                let nfields = [$(stringify!($field)),+].len() as i32;
                buf.extend_from_slice(&nfields.to_be_bytes());
                $($crate::types::serialize_record_field(map, &self.$field, buf)?;)+
                Ok(())
            }
        }

        impl<'a> $crate::types::FromWireValue<'a> for $ty {
            fn parse(
                map: &$crate::OidMap,
                oid: $crate::protocol::types::Oid,
                bytes: &'a [u8],
            ) -> $crate::Result<Self> {
                if oid != map.oid_of($pg_name)? {
                    return Err($crate::Error::Decode(format!(
                        "cannot decode oid {} as \"{}\"",
                        oid, $pg_name
                    )));
                }
                let nfields = [$(stringify!($field)),+].len();
                let mut reader = $crate::types::RecordReader::new(bytes, nfields)?;
                $(let $field = reader.field::<$fty>(map)?;)+
                reader.finish()?;
                Ok($ty { $($field),+ })
            }
        }

        impl $crate::types::PgType for Vec<$ty> {
            fn oid(
                map: &$crate::OidMap,
            ) -> $crate::Result<$crate::protocol::types::Oid> {
                map.array_oid_of($pg_name)
            }

            fn array_oid(
                _map: &$crate::OidMap,
            ) -> $crate::Result<$crate::protocol::types::Oid> {
                Err($crate::Error::Unsupported("arrays of arrays".into()))
            }

            fn collect_new_udts(map: &$crate::OidMap, out: &mut Vec<&'static str>) {
                <$ty as $crate::types::PgType>::collect_new_udts(map, out);
            }
        }

        impl $crate::types::ToWireValue for Vec<$ty> {
            fn wire_size(&self, map: &$crate::OidMap) -> $crate::Result<usize> {
                $crate::types::array_wire_size(map, self)
            }

            fn serialize(
                &self,
                map: &$crate::OidMap,
                buf: &mut Vec<u8>,
            ) -> $crate::Result<()> {
                $crate::types::serialize_array(map, self, buf)
            }
        }

        impl<'a> $crate::types::FromWireValue<'a> for Vec<$ty> {
            fn parse(
                map: &$crate::OidMap,
                oid: $crate::protocol::types::Oid,
                bytes: &'a [u8],
            ) -> $crate::Result<Self> {
                $crate::types::parse_array(map, oid, bytes)
            }
        }
    };
}
