//! Parameter block for one exec.
//!
//! Flattens a heterogeneous argument pack into the parallel arrays the Bind
//! message needs: OIDs, value payloads, lengths, and formats (always
//! binary). Values live in one owned byte buffer and are addressed by
//! offset, so the buffer may grow freely during serialization.

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::protocol::types::Oid;
use crate::types::ToWireValue;

#[derive(Debug, Clone, Copy)]
struct ParamField {
    oid: Oid,
    offset: usize,
    len: usize,
    null: bool,
}

/// Encoded parameters for one exec, owning the backing byte buffer.
#[derive(Debug, Default)]
pub struct Params {
    buffer: Vec<u8>,
    fields: Vec<ParamField>,
}

impl Params {
    /// Encode a parameter pack against the given OID map.
    ///
    /// Fails without side effects on the connection: nothing has been
    /// submitted yet when a value cannot be encoded.
    pub fn build<P: ToParams>(map: &OidMap, params: &P) -> Result<Params> {
        let mut out = Params {
            buffer: Vec::new(),
            fields: Vec::with_capacity(params.count()),
        };
        params.write(map, &mut out)?;
        Ok(out)
    }

    /// Append one value.
    pub fn push<T: ToWireValue + ?Sized>(&mut self, map: &OidMap, value: &T) -> Result<()> {
        let oid = T::oid(map)?;
        if value.is_wire_null() {
            self.fields.push(ParamField {
                oid,
                offset: self.buffer.len(),
                len: 0,
                null: true,
            });
            return Ok(());
        }

        let len = value.wire_size(map)?;
        if len > i32::MAX as usize {
            return Err(Error::SizeOverflow);
        }
        let offset = self.buffer.len();
        self.buffer.reserve(len);
        value.serialize(map, &mut self.buffer)?;
        debug_assert_eq!(self.buffer.len() - offset, len);

        self.fields.push(ParamField {
            oid,
            offset,
            len,
            null: false,
        });
        Ok(())
    }

    /// Number of parameters.
    pub fn count(&self) -> usize {
        self.fields.len()
    }

    /// Parameter type OIDs, in declaration order.
    pub fn oids(&self) -> Vec<Oid> {
        self.fields.iter().map(|f| f.oid).collect()
    }

    /// Parameter payloads, in declaration order; `None` is SQL NULL.
    pub fn values(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.fields.iter().map(|f| {
            if f.null {
                None
            } else {
                Some(&self.buffer[f.offset..f.offset + f.len])
            }
        })
    }
}

/// A pack of exec parameters.
///
/// Implemented for `()` and tuples of [`ToWireValue`] types up to eight
/// elements.
pub trait ToParams {
    /// Number of parameters in the pack.
    fn count(&self) -> usize;

    /// Accumulate unregistered user-defined type names reachable from the
    /// pack's types.
    fn collect_new_udts(&self, map: &OidMap, out: &mut Vec<&'static str>);

    /// Encode every parameter into `out`.
    fn write(&self, map: &OidMap, out: &mut Params) -> Result<()>;
}

impl ToParams for () {
    fn count(&self) -> usize {
        0
    }

    fn collect_new_udts(&self, _map: &OidMap, _out: &mut Vec<&'static str>) {}

    fn write(&self, _map: &OidMap, _out: &mut Params) -> Result<()> {
        Ok(())
    }
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn count(&self) -> usize {
        (*self).count()
    }

    fn collect_new_udts(&self, map: &OidMap, out: &mut Vec<&'static str>) {
        (*self).collect_new_udts(map, out);
    }

    fn write(&self, map: &OidMap, out: &mut Params) -> Result<()> {
        (*self).write(map, out)
    }
}

macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToWireValue),+> ToParams for ($($T,)+) {
            fn count(&self) -> usize {
                $count
            }

            fn collect_new_udts(&self, map: &OidMap, out: &mut Vec<&'static str>) {
                $($T::collect_new_udts(map, out);)+
            }

            fn write(&self, map: &OidMap, out: &mut Params) -> Result<()> {
                $(out.push(map, &self.$idx)?;)+
                Ok(())
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_empty_pack() {
        let map = OidMap::new();
        let params = Params::build(&map, &()).unwrap();
        assert_eq!(params.count(), 0);
        assert!(params.oids().is_empty());
        assert_eq!(params.values().count(), 0);
    }

    #[test]
    fn test_mixed_pack() {
        let map = OidMap::new();
        let params = Params::build(&map, &(42_i32, "hi", Option::<i64>::None)).unwrap();

        assert_eq!(params.count(), 3);
        assert_eq!(params.oids(), [oid::INT4, oid::TEXT, oid::INT8]);

        let values: Vec<_> = params.values().collect();
        assert_eq!(values[0], Some(&42_i32.to_be_bytes()[..]));
        assert_eq!(values[1], Some(&b"hi"[..]));
        assert_eq!(values[2], None);
    }

    #[test]
    fn test_zero_length_text_is_not_null() {
        let map = OidMap::new();
        let params = Params::build(&map, &("",)).unwrap();
        let values: Vec<_> = params.values().collect();
        assert_eq!(values[0], Some(&b""[..]));
    }

    #[test]
    fn test_unknown_udt_fails_before_submission() {
        let map = OidMap::new();
        let result = Params::build(&map, &(vec![1_i32],));
        assert!(result.is_ok());

        // A pack is rejected as a whole when any value has no OID.
        struct Unregistered {
            n: i32,
        }
        crate::composite_type!(Unregistered, "no_such_type", { n: i32 });
        assert!(matches!(
            Params::build(&map, &(Unregistered { n: 1 },)),
            Err(Error::UnknownOid(_))
        ));
    }
}
