//! Query-result backend messages.

use zerocopy::byteorder::big_endian::U16 as U16BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_cstr, read_i16, read_i32, read_u16, read_u32};
use crate::protocol::types::{FormatCode, Oid};

/// RowDescription message header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct RowDescriptionHead {
    num_fields: U16BE,
}

/// Field description within a RowDescription.
#[derive(Debug, Clone)]
pub struct FieldDescription<'a> {
    /// Field name
    pub name: &'a str,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Format code (0=text, 1=binary)
    pub format: FormatCode,
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("RowDescription: missing header".into()));
        }
        let head = RowDescriptionHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("RowDescription header: {e:?}")))?;

        let num_fields = head.num_fields.get() as usize;
        let mut fields = Vec::with_capacity(num_fields);
        let mut data = &payload[2..];

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (_table_oid, rest) = read_u32(rest)?;
            let (_column_id, rest) = read_i16(rest)?;
            let (type_oid, rest) = read_u32(rest)?;
            let (type_size, rest) = read_i16(rest)?;
            let (_type_modifier, rest) = read_i32(rest)?;
            let (format_code, rest) = read_u16(rest)?;

            fields.push(FieldDescription {
                name,
                type_oid,
                type_size,
                format: FormatCode::from_u16(format_code),
            });

            data = rest;
        }

        Ok(Self { fields })
    }

    /// Get field descriptions.
    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }
}

/// DataRow message header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct DataRowHead {
    num_columns: U16BE,
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("DataRow: missing header".into()));
        }
        let head = DataRowHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("DataRow header: {e:?}")))?;

        Ok(Self {
            num_columns: head.num_columns.get(),
            columns_data: &payload[2..],
        })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Iterate over column values; `None` represents NULL.
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
        }
    }

    /// Get a column value by index.
    ///
    /// Outer `None` means the index is out of range; inner `None` is NULL.
    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        self.iter().nth(index)
    }
}

/// Iterator over column values in a DataRow.
#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        // A negative cell length marks NULL; no payload follows it.
        let (len, rest) = read_i32(self.remaining).ok()?;
        if len < 0 {
            self.remaining = rest;
            return Some(None);
        }
        let (value, rest) = read_bytes(rest, len as usize).ok()?;
        self.remaining = rest;
        Some(Some(value))
    }
}

/// CommandComplete message - successful completion of one command.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }

    /// Parse the number of rows affected from the command tag.
    ///
    /// Row-reporting tags put the count last; INSERT wedges a legacy OID
    /// field in between ("INSERT <oid> <rows>").
    pub fn rows_affected(&self) -> Option<u64> {
        let mut words = self.tag.split_ascii_whitespace();
        let count = match words.next()? {
            "INSERT" => words.nth(1),
            "SELECT" | "UPDATE" | "DELETE" | "COPY" | "MOVE" | "FETCH" => words.next(),
            _ => None,
        };
        count?.parse().ok()
    }
}

/// EmptyQueryResponse message - response to an empty query string.
#[derive(Debug, Clone, Copy)]
pub struct EmptyQueryResponse;

impl EmptyQueryResponse {
    /// Parse an EmptyQueryResponse message from payload bytes.
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}
