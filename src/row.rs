//! Row decoding into typed tuples.

use crate::error::{Error, Result};
use crate::oid_map::OidMap;
use crate::result::Row;
use crate::types::FromWireValue;

/// Decodes one result row into a Rust type.
///
/// Implemented for tuples of [`FromWireValue`] types: column `i` is decoded
/// with the OID of column `i`.
pub trait FromRow<'a>: Sized {
    /// Decode a row using its column metadata.
    fn from_row(map: &OidMap, row: &Row<'a>) -> Result<Self>;
}

fn decode_column<'a, T: FromWireValue<'a>>(
    map: &OidMap,
    row: &Row<'a>,
    index: usize,
) -> Result<T> {
    let cell = row
        .get(index)
        .ok_or_else(|| Error::Decode(format!("row has no column {index}")))?;
    let column = row
        .columns()
        .get(index)
        .ok_or_else(|| Error::Decode(format!("missing descriptor for column {index}")))?;
    match cell {
        None => T::from_null(),
        Some(bytes) => T::parse(map, column.type_oid, bytes),
    }
}

macro_rules! impl_from_row {
    ($($idx:tt: $T:ident),+) => {
        impl<'a, $($T: FromWireValue<'a>),+> FromRow<'a> for ($($T,)+) {
            fn from_row(map: &OidMap, row: &Row<'a>) -> Result<Self> {
                Ok(($(decode_column::<$T>(map, row, $idx)?,)+))
            }
        }
    };
}

impl_from_row!(0: T0);
impl_from_row!(0: T0, 1: T1);
impl_from_row!(0: T0, 1: T1, 2: T2);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
