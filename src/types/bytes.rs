//! Byte-string type implementations (&[u8], Vec<u8>).

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::types::{oid, Oid};

use super::{FromWireValue, PgType, ToWireValue};

impl PgType for [u8] {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::BYTEA)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::BYTEA_ARRAY)
    }
}

impl ToWireValue for [u8] {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(self.len())
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl<'a> FromWireValue<'a> for &'a [u8] {
    fn parse(_map: &OidMap, oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if oid != oid::BYTEA {
            return Err(Error::Decode(format!(
                "cannot decode oid {} as bytes",
                oid
            )));
        }
        Ok(bytes)
    }
}

impl PgType for Vec<u8> {
    fn oid(map: &OidMap) -> Result<Oid> {
        <[u8]>::oid(map)
    }

    fn array_oid(map: &OidMap) -> Result<Oid> {
        <[u8]>::array_oid(map)
    }
}

impl ToWireValue for Vec<u8> {
    fn wire_size(&self, map: &OidMap) -> Result<usize> {
        self.as_slice().wire_size(map)
    }

    fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        self.as_slice().serialize(map, buf)
    }
}

impl FromWireValue<'_> for Vec<u8> {
    fn parse(map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&[u8]>::parse(map, oid, bytes).map(<[u8]>::to_vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytea_roundtrip() {
        let map = OidMap::new();
        let data = vec![0_u8, 1, 2, 255];
        let mut buf = Vec::new();
        data.serialize(&map, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(Vec::<u8>::parse(&map, oid::BYTEA, &buf).unwrap(), data);
        assert!(Vec::<u8>::parse(&map, oid::TEXT, &buf).is_err());
    }
}
