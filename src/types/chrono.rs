//! Timestamp implementations for chrono types.
//!
//! Binary timestamps are a 64-bit count of microseconds since
//! 2000-01-01T00:00:00 UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::types::{oid, Oid, PG_EPOCH_MICROS};

use super::array::{array_from_impls, array_impls};
use super::{FromWireValue, PgType, ToWireValue};

fn read_micros(what: &str, bytes: &[u8]) -> Result<i64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {what} length: {}", bytes.len())))?;
    Ok(i64::from_be_bytes(arr))
}

fn from_micros(what: &str, micros: i64) -> Result<DateTime<Utc>> {
    micros
        .checked_add(PG_EPOCH_MICROS)
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .ok_or_else(|| Error::Decode(format!("{what} out of range: {micros}")))
}

fn to_micros(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_micros() - PG_EPOCH_MICROS
}

impl PgType for NaiveDateTime {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::TIMESTAMP)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::TIMESTAMP_ARRAY)
    }
}

impl ToWireValue for NaiveDateTime {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(8)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&to_micros(&self.and_utc()).to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for NaiveDateTime {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::Decode(format!(
                "cannot decode oid {} as NaiveDateTime",
                oid
            )));
        }
        let micros = read_micros("timestamp", bytes)?;
        Ok(from_micros("timestamp", micros)?.naive_utc())
    }
}

impl PgType for DateTime<Utc> {
    fn oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::TIMESTAMPTZ)
    }

    fn array_oid(_map: &OidMap) -> Result<Oid> {
        Ok(oid::TIMESTAMPTZ_ARRAY)
    }
}

impl ToWireValue for DateTime<Utc> {
    fn wire_size(&self, _map: &OidMap) -> Result<usize> {
        Ok(8)
    }

    fn serialize(&self, _map: &OidMap, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&to_micros(self).to_be_bytes());
        Ok(())
    }
}

impl FromWireValue<'_> for DateTime<Utc> {
    fn parse(_map: &OidMap, oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::Decode(format!(
                "cannot decode oid {} as DateTime<Utc>",
                oid
            )));
        }
        let micros = read_micros("timestamptz", bytes)?;
        from_micros("timestamptz", micros)
    }
}

array_impls!(NaiveDateTime, DateTime<Utc>);
array_from_impls!(NaiveDateTime, DateTime<Utc>);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_epoch_is_zero_bytes() {
        let map = OidMap::new();
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut buf = Vec::new();
        epoch.serialize(&map, &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let map = OidMap::new();
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_micro_opt(10, 30, 0, 123_456)
            .unwrap();
        let mut buf = Vec::new();
        dt.serialize(&map, &mut buf).unwrap();
        assert_eq!(buf.len(), dt.wire_size(&map).unwrap());
        assert_eq!(NaiveDateTime::parse(&map, oid::TIMESTAMP, &buf).unwrap(), dt);
    }

    #[test]
    fn test_timestamptz_roundtrip() {
        let map = OidMap::new();
        let dt = DateTime::<Utc>::from_timestamp_micros(1_700_000_000_123_456).unwrap();
        let mut buf = Vec::new();
        dt.serialize(&map, &mut buf).unwrap();
        assert_eq!(DateTime::<Utc>::parse(&map, oid::TIMESTAMPTZ, &buf).unwrap(), dt);
    }

    #[test]
    fn test_pre_epoch_timestamp() {
        let map = OidMap::new();
        let dt = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let mut buf = Vec::new();
        dt.serialize(&map, &mut buf).unwrap();
        assert_eq!(i64::from_be_bytes(buf[..8].try_into().unwrap()), -1_000_000);
        assert_eq!(NaiveDateTime::parse(&map, oid::TIMESTAMP, &buf).unwrap(), dt);
    }
}
