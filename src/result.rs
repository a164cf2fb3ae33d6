//! Query results.
//!
//! A [`QueryResult`] owns everything the server sent for one logical
//! command: a status, column descriptors, row payloads, and error fields
//! for error-status results. It is assembled by the session's reader side
//! and immutable once surfaced.

use crate::error::{Result, ServerError};
use crate::oid_map::OidMap;
use crate::protocol::backend::query::CommandComplete;
use crate::protocol::codec::{read_bytes, read_i32};
use crate::protocol::types::{FormatCode, Oid};
use crate::row::FromRow;

/// Status of one protocol-level result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// A command that returns no rows completed.
    CommandOk,
    /// A command completed with a row set (possibly empty).
    RowsReturned,
    /// The fence terminating one pipeline batch. Consumed by the
    /// connection's reader and never surfaced to callers.
    PipelineSync,
    /// The query string was empty.
    EmptyQuery,
    /// The server rejected the command.
    FatalError,
    /// A warning-level server report attached to a command.
    NonfatalError,
    /// The command was skipped because an earlier command in the same
    /// pipeline batch failed.
    PipelineAborted,
}

impl ResultStatus {
    /// True for the error-carrying statuses.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ResultStatus::FatalError | ResultStatus::NonfatalError | ResultStatus::PipelineAborted
        )
    }
}

/// Descriptor of one result column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub type_oid: Oid,
    pub type_size: i16,
    pub format: FormatCode,
}

/// One stored row: the column count and the cell data from a DataRow
/// message, without the protocol header.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub num_columns: u16,
    pub data: Vec<u8>,
}

/// The result of one logical command.
#[derive(Debug)]
pub struct QueryResult {
    status: ResultStatus,
    columns: Vec<Column>,
    rows: Vec<StoredRow>,
    error: Option<ServerError>,
    command_tag: Option<String>,
}

impl QueryResult {
    pub(crate) fn command(tag: &str, columns: Vec<Column>, rows: Vec<StoredRow>, saw_rows: bool) -> Self {
        Self {
            status: if saw_rows {
                ResultStatus::RowsReturned
            } else {
                ResultStatus::CommandOk
            },
            columns,
            rows,
            error: None,
            command_tag: Some(tag.to_string()),
        }
    }

    pub(crate) fn empty_query() -> Self {
        Self::bare(ResultStatus::EmptyQuery)
    }

    pub(crate) fn pipeline_sync() -> Self {
        Self::bare(ResultStatus::PipelineSync)
    }

    pub(crate) fn pipeline_aborted() -> Self {
        Self::bare(ResultStatus::PipelineAborted)
    }

    pub(crate) fn server_error(error: ServerError) -> Self {
        Self {
            error: Some(error),
            ..Self::bare(ResultStatus::FatalError)
        }
    }

    fn bare(status: ResultStatus) -> Self {
        Self {
            status,
            columns: Vec::new(),
            rows: Vec::new(),
            error: None,
            command_tag: None,
        }
    }

    /// Status of this result.
    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// Column descriptors, empty for row-less results.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the result set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over the rows.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            result: self,
            index: 0,
        }
    }

    /// Get one row by index.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|stored| Row {
            columns: &self.columns,
            num_columns: stored.num_columns,
            data: &stored.data,
        })
    }

    /// Server error fields, present for error-status results.
    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }

    /// The command tag reported by the server (e.g. "SELECT 2").
    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.as_deref()
    }

    /// Rows affected, parsed from the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        let tag = self.command_tag.as_deref()?;
        CommandComplete { tag }.rows_affected()
    }
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    num_columns: u16,
    data: &'a [u8],
}

impl<'a> Row<'a> {
    /// Number of cells in this row.
    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    /// True when the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Column descriptors for this row.
    pub fn columns(&self) -> &'a [Column] {
        self.columns
    }

    /// Get one cell's bytes.
    ///
    /// Outer `None` means the index is out of range; inner `None` is NULL.
    /// Cells borrow the result's memory; copying is the caller's business.
    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        if index >= self.num_columns as usize {
            return None;
        }
        self.cells().nth(index)
    }

    /// Iterate over the cells; `None` is NULL.
    pub fn cells(&self) -> Cells<'a> {
        Cells {
            remaining: self.data,
        }
    }

    /// Decode this row into a typed value, typically a tuple: column `i` is
    /// decoded by `parse` with the column's OID.
    pub fn decode<T: FromRow<'a>>(&self, map: &OidMap) -> Result<T> {
        T::from_row(map, self)
    }
}

/// Iterator over the cells of one row.
#[derive(Debug, Clone)]
pub struct Cells<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for Cells<'a> {
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

/// Iterator over the rows of a result.
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    result: &'a QueryResult,
    index: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.result.row(self.index)?;
        self.index += 1;
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    pub(crate) fn int4_result(values: &[i32]) -> QueryResult {
        let columns = vec![Column {
            name: "n".into(),
            type_oid: oid::INT4,
            type_size: 4,
            format: FormatCode::Binary,
        }];
        let rows = values
            .iter()
            .map(|v| {
                let mut data = 4_i32.to_be_bytes().to_vec();
                data.extend_from_slice(&v.to_be_bytes());
                StoredRow {
                    num_columns: 1,
                    data,
                }
            })
            .collect();
        QueryResult::command("SELECT 1", columns, rows, true)
    }

    #[test]
    fn test_row_access() {
        let result = int4_result(&[7, 8]);
        assert_eq!(result.status(), ResultStatus::RowsReturned);
        assert_eq!(result.len(), 2);

        let row = result.row(0).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.get(0), Some(Some(&7_i32.to_be_bytes()[..])));
        assert_eq!(row.get(1), None);
        assert!(result.row(2).is_none());
    }

    #[test]
    fn test_decode_rows() {
        let result = int4_result(&[7, 8]);
        let map = OidMap::new();
        let values: Vec<i32> = result
            .rows()
            .map(|row| row.decode::<(i32,)>(&map).unwrap().0)
            .collect();
        assert_eq!(values, [7, 8]);
    }

    #[test]
    fn test_rows_affected() {
        let result = QueryResult::command("INSERT 0 2", Vec::new(), Vec::new(), false);
        assert_eq!(result.status(), ResultStatus::CommandOk);
        assert_eq!(result.rows_affected(), Some(2));
    }

    #[test]
    fn test_error_result() {
        let mut fields = ServerError::default();
        fields.set_field(b'S', "ERROR");
        fields.set_field(b'M', "boom");
        let result = QueryResult::server_error(fields);
        assert_eq!(result.status(), ResultStatus::FatalError);
        assert!(result.status().is_error());
        assert_eq!(result.error().unwrap().message(), Some("boom"));
    }
}
