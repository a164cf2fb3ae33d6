//! Text type implementations (&str, String).
//!
//! Text payloads are raw UTF-8 with no terminator and no embedded length;
//! the enclosing parameter descriptor or field header carries the length.

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::types::{oid, Oid};

use super::{FromWireValue, PgType, ToWireValue};

fn check_text_oid(what: &str, oid_value: Oid) -> Result<()> {
    if !matches!(
        oid_value,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME
    ) {
        return Err(Error::Decode(format!(
            "cannot decode oid {} as {what}",
            oid_value
        )));
    }
    Ok(())
}

impl PgType for str {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::TEXT)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::TEXT_ARRAY)
    }
}

impl ToWireValue for str {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(self.len())
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl<'a> FromWireValue<'a> for &'a str {
    fn parse(_map: &OidMap, oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        check_text_oid("str", oid)?;
        simdutf8::compat::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
    }
}

impl PgType for String {
    fn oid(map: &OidMap) -> Result<Oid> {
        str::oid(map)
    }

    fn array_oid(map: &OidMap) -> Result<Oid> {
        str::array_oid(map)
    }
}

impl ToWireValue for String {
    fn wire_size(&self, map: &OidMap) -> Result<usize> {
        self.as_str().wire_size(map)
    }

    fn serialize(&self, map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        self.as_str().serialize(map, buf)
    }
}

impl FromWireValue<'_> for String {
    fn parse(map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::parse(map, oid, bytes).map(str::to_owned)
    }
}
