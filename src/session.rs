//! Sans-I/O protocol session for pipeline mode.
//!
//! The session owns the byte buffers and protocol bookkeeping between the
//! connection engine and the socket: queued outbound messages on one side,
//! unparsed inbound bytes and result assembly on the other. It performs no
//! I/O itself; the run-loop moves bytes and asks for completed results.
//!
//! One command-queue entry is tracked per submitted query plus one per sync
//! fence. After a server error the remaining entries of the batch receive
//! synthesized [`ResultStatus::PipelineAborted`] results when the fence's
//! ReadyForQuery arrives, so responses never slip against submissions.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::params::Params;
use crate::protocol::backend::query::{CommandComplete, DataRow, RowDescription};
use crate::protocol::backend::{msg_type, parse_error_fields, ReadyForQuery};
use crate::protocol::codec::split_frame;
use crate::protocol::frontend::{
    write_bind, write_describe_portal, write_execute, write_parse, write_sync,
};
use crate::result::{Column, QueryResult, StoredRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Query,
    Sync,
}

/// Protocol state for one pipeline-mode connection.
#[derive(Debug, Default)]
pub(crate) struct Session {
    out: Vec<u8>,
    out_pos: usize,
    inbuf: Vec<u8>,
    in_pos: usize,
    queue: VecDeque<PendingKind>,
    columns: Vec<Column>,
    rows: Vec<StoredRow>,
    saw_rows: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // === Outbound ===

    /// Queue one query for execution: Parse, Bind, Describe, Execute over
    /// the unnamed statement and portal.
    pub fn send_query_params(&mut self, query: &str, params: &Params) {
        write_parse(&mut self.out, "", query, &params.oids());
        write_bind(&mut self.out, "", "", params);
        write_describe_portal(&mut self.out, "");
        write_execute(&mut self.out, "", 0);
        self.queue.push_back(PendingKind::Query);
    }

    /// Queue a sync fence terminating the current batch.
    pub fn pipeline_sync(&mut self) {
        write_sync(&mut self.out);
        self.queue.push_back(PendingKind::Sync);
    }

    /// True while queued output remains unsent.
    pub fn has_output(&self) -> bool {
        self.out_pos < self.out.len()
    }

    /// The unsent tail of the output buffer.
    pub fn output(&self) -> &[u8] {
        &self.out[self.out_pos..]
    }

    /// Record that `n` output bytes were written to the socket.
    pub fn consume_output(&mut self, n: usize) {
        self.out_pos += n;
        debug_assert!(self.out_pos <= self.out.len());
        if self.out_pos == self.out.len() {
            self.out.clear();
            self.out_pos = 0;
        }
    }

    // === Inbound ===

    /// Append bytes received from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbuf.extend_from_slice(bytes);
    }

    /// Number of submitted commands (sync fences included) whose results
    /// have not been fully parsed yet.
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Parse the next completed result out of the input buffer.
    ///
    /// Returns `Ok(None)` when the buffered input holds no further complete
    /// result; the caller should wait for socket readability and `feed`
    /// more bytes.
    pub fn next_result(&mut self) -> Result<Option<QueryResult>> {
        loop {
            let Some((type_byte, payload_range, consumed)) = self.peek_frame()? else {
                self.compact();
                return Ok(None);
            };
            let payload = &self.inbuf[payload_range.0..payload_range.1];

            match type_byte {
                msg_type::READY_FOR_QUERY => {
                    // Commands still queued ahead of the fence were
                    // discarded by the server after an error; reflect each
                    // as an aborted result before consuming the fence.
                    if self.queue.front() == Some(&PendingKind::Query) {
                        self.queue.pop_front();
                        return Ok(Some(QueryResult::pipeline_aborted()));
                    }
                    ReadyForQuery::parse(payload)?;
                    self.advance(consumed);
                    match self.queue.pop_front() {
                        Some(PendingKind::Sync) => return Ok(Some(QueryResult::pipeline_sync())),
                        _ => {
                            return Err(Error::Protocol(
                                "ReadyForQuery without a pending sync".into(),
                            ))
                        }
                    }
                }
                msg_type::ROW_DESCRIPTION => {
                    let description = RowDescription::parse(payload)?;
                    self.columns = description
                        .fields()
                        .iter()
                        .map(|f| Column {
                            name: f.name.to_string(),
                            type_oid: f.type_oid,
                            type_size: f.type_size,
                            format: f.format,
                        })
                        .collect();
                    self.saw_rows = true;
                    self.rows.clear();
                    self.advance(consumed);
                }
                msg_type::DATA_ROW => {
                    let row = DataRow::parse(payload)?;
                    self.rows.push(StoredRow {
                        num_columns: row.len() as u16,
                        data: payload[2..].to_vec(),
                    });
                    self.advance(consumed);
                }
                msg_type::COMMAND_COMPLETE => {
                    let complete = CommandComplete::parse(payload)?;
                    let result = QueryResult::command(
                        complete.tag,
                        std::mem::take(&mut self.columns),
                        std::mem::take(&mut self.rows),
                        std::mem::replace(&mut self.saw_rows, false),
                    );
                    self.advance(consumed);
                    self.pop_query()?;
                    return Ok(Some(result));
                }
                msg_type::EMPTY_QUERY_RESPONSE => {
                    self.advance(consumed);
                    self.pop_query()?;
                    self.reset_building();
                    return Ok(Some(QueryResult::empty_query()));
                }
                msg_type::ERROR_RESPONSE => {
                    let fields = parse_error_fields(payload)?;
                    self.advance(consumed);
                    self.reset_building();
                    if self.queue.front() == Some(&PendingKind::Query) {
                        self.queue.pop_front();
                        return Ok(Some(QueryResult::server_error(fields)));
                    }
                    // An error outside any submitted command is fatal to
                    // the connection itself.
                    return Err(Error::Server(fields));
                }
                msg_type::PARSE_COMPLETE
                | msg_type::BIND_COMPLETE
                | msg_type::CLOSE_COMPLETE
                | msg_type::NO_DATA
                | msg_type::PARAMETER_DESCRIPTION
                | msg_type::PORTAL_SUSPENDED => {
                    self.advance(consumed);
                }
                // Server notices are dropped unconditionally; parameter
                // changes and notifications are absorbed.
                msg_type::NOTICE_RESPONSE
                | msg_type::NOTIFICATION_RESPONSE
                | msg_type::PARAMETER_STATUS => {
                    self.advance(consumed);
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message type '{}'",
                        other as char
                    )));
                }
            }
        }
    }

    fn peek_frame(&self) -> Result<Option<(u8, (usize, usize), usize)>> {
        match split_frame(&self.inbuf[self.in_pos..])? {
            Some((type_byte, payload, consumed)) => {
                let start = self.in_pos + 5;
                Ok(Some((type_byte, (start, start + payload.len()), consumed)))
            }
            None => Ok(None),
        }
    }

    fn advance(&mut self, consumed: usize) {
        self.in_pos += consumed;
    }

    fn compact(&mut self) {
        if self.in_pos > 0 {
            self.inbuf.drain(..self.in_pos);
            self.in_pos = 0;
        }
    }

    fn pop_query(&mut self) -> Result<()> {
        match self.queue.pop_front() {
            Some(PendingKind::Query) => Ok(()),
            _ => Err(Error::Protocol(
                "command completion without a pending command".into(),
            )),
        }
    }

    fn reset_building(&mut self) {
        self.columns.clear();
        self.rows.clear();
        self.saw_rows = false;
    }
}
