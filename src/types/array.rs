//! One-dimensional array encoding.
//!
//! Wire layout: `i32 ndim=1, i32 hasnull=0, i32 element_oid, i32 nelems,
//! i32 lower_bound=0`, then per element `i32 length, bytes`. The server
//! encodes an empty array as `ndim=0` with no dimension header; decoding
//! accepts both forms.

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::codec::read_i32;
use crate::protocol::types::Oid;

use super::{FromWireValue, PgType, ToWireValue};

pub fn array_wire_size<T: ToWireValue>(map: &OidMap, items: &[T]) -> Result<usize> {
    let mut size = 20_usize;
    for item in items {
        size += 4 + item.wire_size(map)?;
    }
    Ok(size)
}

pub fn serialize_array<T: ToWireValue>(
    map: &OidMap,
    items: &[T],
    buf: &mut Vec<u8>,
) -> Result<()> {
    let elem_oid = T::oid(map)?;
    buf.extend_from_slice(&1_i32.to_be_bytes());
    buf.extend_from_slice(&0_i32.to_be_bytes());
    buf.extend_from_slice(&elem_oid.to_be_bytes());
    buf.extend_from_slice(&(items.len() as i32).to_be_bytes());
    buf.extend_from_slice(&0_i32.to_be_bytes());

    for item in items {
        let len = item.wire_size(map)?;
        if len > i32::MAX as usize {
            return Err(Error::SizeOverflow);
        }
        buf.extend_from_slice(&(len as i32).to_be_bytes());
        item.serialize(map, buf)?;
    }
    Ok(())
}

pub fn parse_array<'a, T>(map: &OidMap, oid: Oid, bytes: &'a [u8]) -> Result<Vec<T>>
where
    T: FromWireValue<'a> + PgType,
{
    if oid != T::array_oid(map)? {
        return Err(Error::Decode(format!(
            "cannot decode oid {} as an array of this element type",
            oid
        )));
    }

    let (ndim, rest) = read_i32(bytes)?;
    let (_hasnull, rest) = read_i32(rest)?;
    let (elem_oid, rest) = read_i32(rest)?;
    let elem_oid = elem_oid as Oid;

    if ndim == 0 {
        return Ok(Vec::new());
    }
    if ndim != 1 {
        return Err(Error::Decode(format!(
            "unsupported array dimensionality {}",
            ndim
        )));
    }

    let (nelems, rest) = read_i32(rest)?;
    let (_lower_bound, mut data) = read_i32(rest)?;
    if nelems < 0 {
        return Err(Error::Decode(format!("invalid array length {}", nelems)));
    }

    let mut items = Vec::with_capacity(nelems as usize);
    for _ in 0..nelems {
        let (len, rest) = read_i32(data)?;
        if len < 0 {
            items.push(T::from_null()?);
            data = rest;
        } else {
            let len = len as usize;
            if rest.len() < len {
                return Err(Error::Decode("truncated array element".into()));
            }
            items.push(T::parse(map, elem_oid, &rest[..len])?);
            data = &rest[len..];
        }
    }
    Ok(items)
}

/// Implements the array traits for `Vec<T>` over the listed element types.
///
/// Array types have no array type of their own; nesting is rejected.
macro_rules! array_impls {
    ($($t:ty),+ $(,)?) => {$(
        impl $crate::types::PgType for Vec<$t> {
            fn oid(map: &$crate::oid_map::OidMap) -> $crate::error::Result<$crate::protocol::types::Oid> {
                <$t as $crate::types::PgType>::array_oid(map)
            }

            fn array_oid(_map: &$crate::oid_map::OidMap) -> $crate::error::Result<$crate::protocol::types::Oid> {
                Err($crate::error::Error::Unsupported("arrays of arrays".into()))
            }

            fn collect_new_udts(map: &$crate::oid_map::OidMap, out: &mut Vec<&'static str>) {
                <$t as $crate::types::PgType>::collect_new_udts(map, out);
            }
        }

        impl $crate::types::ToWireValue for Vec<$t> {
            fn wire_size(&self, map: &$crate::oid_map::OidMap) -> $crate::error::Result<usize> {
                $crate::types::array::array_wire_size(map, self)
            }

            fn serialize(
                &self,
                map: &$crate::oid_map::OidMap,
                buf: &mut Vec<u8>,
            ) -> $crate::error::Result<()> {
                $crate::types::array::serialize_array(map, self, buf)
            }
        }
    )+};
}

/// Adds array decoding for element types that decode to owned values.
macro_rules! array_from_impls {
    ($($t:ty),+ $(,)?) => {$(
        impl $crate::types::FromWireValue<'_> for Vec<$t> {
            fn parse(
                map: &$crate::oid_map::OidMap,
                oid: $crate::protocol::types::Oid,
                bytes: &[u8],
            ) -> $crate::error::Result<Self> {
                $crate::types::array::parse_array(map, oid, bytes)
            }
        }
    )+};
}

pub(crate) use {array_from_impls, array_impls};

array_impls!(bool, i16, i32, i64, f32, f64, String);
array_from_impls!(bool, i16, i32, i64, f32, f64, String);

// Borrowed string slices encode like owned ones; the macro cannot name the
// element lifetime, so these are spelled out.
impl<'s> PgType for Vec<&'s str> {
    fn oid(map: &OidMap) -> Result<Oid> {
        str::array_oid(map)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Err(Error::Unsupported("arrays of arrays".into()))
    }
}

impl<'s> ToWireValue for Vec<&'s str> {
    fn wire_size(&self, map: &OidMap) -> Result<usize> {
        array_wire_size(map, self)
    }

    fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        serialize_array(map, self, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_int4_array_layout() {
        let map = OidMap::new();
        let items = vec![10_i32, 20, 30];
        let mut buf = Vec::new();
        items.serialize(&map, &mut buf).unwrap();

        assert_eq!(buf.len(), items.wire_size(&map).unwrap());
        let mut expected = Vec::new();
        for header in [1_i32, 0, oid::INT4 as i32, 3, 0] {
            expected.extend_from_slice(&header.to_be_bytes());
        }
        for v in [10_i32, 20, 30] {
            expected.extend_from_slice(&4_i32.to_be_bytes());
            expected.extend_from_slice(&v.to_be_bytes());
        }
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_array_roundtrip() {
        let map = OidMap::new();
        let items = vec![10_i32, 20, 30];
        let mut buf = Vec::new();
        items.serialize(&map, &mut buf).unwrap();
        let back: Vec<i32> = Vec::parse(&map, oid::INT4_ARRAY, &buf).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_empty_array() {
        let map = OidMap::new();
        let items: Vec<i64> = Vec::new();
        let mut buf = Vec::new();
        items.serialize(&map, &mut buf).unwrap();

        // Canonical five-int header with nelems=0.
        assert_eq!(buf.len(), 20);
        assert_eq!(items.wire_size(&map).unwrap(), 20);
        let back: Vec<i64> = Vec::parse(&map, oid::INT8_ARRAY, &buf).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_empty_array_server_form() {
        // The server encodes an empty array as ndim=0 with no dimensions.
        let map = OidMap::new();
        let mut buf = Vec::new();
        for header in [0_i32, 0, oid::TEXT as i32] {
            buf.extend_from_slice(&header.to_be_bytes());
        }
        let back: Vec<String> = Vec::parse(&map, oid::TEXT_ARRAY, &buf).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_text_array_roundtrip() {
        let map = OidMap::new();
        let items = vec!["a".to_string(), String::new(), "ccc".to_string()];
        let mut buf = Vec::new();
        items.serialize(&map, &mut buf).unwrap();
        let back: Vec<String> = Vec::parse(&map, oid::TEXT_ARRAY, &buf).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_array_oid_mismatch() {
        let map = OidMap::new();
        let mut buf = Vec::new();
        vec![1_i32].serialize(&map, &mut buf).unwrap();
        assert!(Vec::<i32>::parse(&map, oid::INT8_ARRAY, &buf).is_err());
    }
}
