//! Primitive type implementations (bool, integers, floats, OID).

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::types::{oid, Oid};

use super::{FromWireValue, PgType, ToWireValue};

fn fixed_width<const N: usize>(what: &str, oid: Oid, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        Error::Decode(format!(
            "invalid {what} length {} for oid {oid}",
            bytes.len()
        ))
    })
}

// === Boolean ===

impl PgType for bool {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::BOOL)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::BOOL_ARRAY)
    }
}

impl ToWireValue for bool {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(1)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.push(*self as u8);
        Ok(())
    }
}

impl FromWireValue<'_> for bool {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BOOL {
            return Err(Error::Decode(format!("cannot decode oid {} as bool", oid)));
        }
        let arr: [u8; 1] = fixed_width("bool", oid, bytes)?;
        Ok(arr[0] != 0)
    }
}

// === Integer types ===

impl PgType for i16 {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::INT2)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::INT2_ARRAY)
    }
}

impl ToWireValue for i16 {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(2)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for i16 {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::INT2 {
            return Err(Error::Decode(format!("cannot decode oid {} as i16", oid)));
        }
        Ok(i16::from_be_bytes(fixed_width("i16", oid, bytes)?))
    }
}

impl PgType for i32 {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::INT4)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::INT4_ARRAY)
    }
}

impl ToWireValue for i32 {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(4)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for i32 {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::INT2 => Ok(i16::from_be_bytes(fixed_width("i16", oid, bytes)?) as i32),
            oid::INT4 => Ok(i32::from_be_bytes(fixed_width("i32", oid, bytes)?)),
            _ => Err(Error::Decode(format!("cannot decode oid {} as i32", oid))),
        }
    }
}

impl PgType for i64 {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::INT8)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::INT8_ARRAY)
    }
}

impl ToWireValue for i64 {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(8)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for i64 {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::INT2 => Ok(i16::from_be_bytes(fixed_width("i16", oid, bytes)?) as i64),
            oid::INT4 => Ok(i32::from_be_bytes(fixed_width("i32", oid, bytes)?) as i64),
            oid::INT8 => Ok(i64::from_be_bytes(fixed_width("i64", oid, bytes)?)),
            _ => Err(Error::Decode(format!("cannot decode oid {} as i64", oid))),
        }
    }
}

// === OID ===

impl PgType for u32 {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::OID)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::OID_ARRAY)
    }
}

impl ToWireValue for u32 {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(4)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for u32 {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::OID {
            return Err(Error::Decode(format!("cannot decode oid {} as u32", oid)));
        }
        Ok(u32::from_be_bytes(fixed_width("u32", oid, bytes)?))
    }
}

// === Floating point ===

impl PgType for f32 {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::FLOAT4)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::FLOAT4_ARRAY)
    }
}

impl ToWireValue for f32 {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(4)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for f32 {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::FLOAT4 {
            return Err(Error::Decode(format!("cannot decode oid {} as f32", oid)));
        }
        Ok(f32::from_be_bytes(fixed_width("f32", oid, bytes)?))
    }
}

impl PgType for f64 {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::FLOAT8)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::FLOAT8_ARRAY)
    }
}

impl ToWireValue for f64 {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(8)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for f64 {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::FLOAT4 => Ok(f32::from_be_bytes(fixed_width("f32", oid, bytes)?) as f64),
            oid::FLOAT8 => Ok(f64::from_be_bytes(fixed_width("f64", oid, bytes)?)),
            _ => Err(Error::Decode(format!("cannot decode oid {} as f64", oid))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(value: T) -> T
    where
        T: ToWireValue + for<'a> FromWireValue<'a>,
    {
        let map = OidMap::new();
        let mut buf = Vec::new();
        value.serialize(&map, &mut buf).unwrap();
        assert_eq!(buf.len(), value.wire_size(&map).unwrap());
        T::parse(&map, T::oid(&map).unwrap(), &buf).unwrap()
    }

    #[test]
    fn test_int_roundtrip() {
        assert_eq!(roundtrip(-3_i16), -3);
        assert_eq!(roundtrip(1_000_000_i32), 1_000_000);
        assert_eq!(roundtrip(i64::MIN), i64::MIN);
    }

    #[test]
    fn test_float_roundtrip() {
        assert_eq!(roundtrip(1.5_f32), 1.5);
        assert_eq!(roundtrip(-2.25_f64), -2.25);
    }

    #[test]
    fn test_bool_roundtrip() {
        assert!(roundtrip(true));
        assert!(!roundtrip(false));
    }

    #[test]
    fn test_big_endian_layout() {
        let map = OidMap::new();
        let mut buf = Vec::new();
        1_i32.serialize(&map, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 1]);
    }

    #[test]
    fn test_widening_decode() {
        let map = OidMap::new();
        let v = i64::parse(&map, oid::INT2, &7_i16.to_be_bytes()).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_oid_mismatch() {
        let map = OidMap::new();
        assert!(i32::parse(&map, oid::TEXT, &[0, 0, 0, 1]).is_err());
        assert!(i32::parse(&map, oid::INT4, &[0, 0, 1]).is_err());
    }
}
