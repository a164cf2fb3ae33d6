//! Common PostgreSQL wire protocol types and OID constants.

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// How a value travels on the wire. Code 0 selects the text rendering;
/// this crate requests code 1, the packed binary encoding, for every
/// parameter and result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    /// UTF-8 rendering of the value
    #[default]
    Text = 0,
    /// Type-specific packed encoding
    Binary = 1,
}

impl FormatCode {
    /// Interpret a raw wire code; anything but 1 falls back to text.
    pub fn from_u16(raw: u16) -> Self {
        if raw == 1 {
            FormatCode::Binary
        } else {
            FormatCode::Text
        }
    }
}

/// OIDs of built-in types, as listed in `pg_type.dat`.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const RECORD: Oid = 2249;

    // Array types (typarray of the above).
    pub const BOOL_ARRAY: Oid = 1000;
    pub const BYTEA_ARRAY: Oid = 1001;
    pub const INT2_ARRAY: Oid = 1005;
    pub const INT4_ARRAY: Oid = 1007;
    pub const TEXT_ARRAY: Oid = 1009;
    pub const INT8_ARRAY: Oid = 1016;
    pub const FLOAT4_ARRAY: Oid = 1021;
    pub const FLOAT8_ARRAY: Oid = 1022;
    pub const OID_ARRAY: Oid = 1028;
    pub const TIMESTAMP_ARRAY: Oid = 1115;
    pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
}

/// Microseconds between the Unix epoch and 2000-01-01T00:00:00Z, the
/// reference point of binary timestamp values.
pub const PG_EPOCH_MICROS: i64 = 946_684_800_000_000;
