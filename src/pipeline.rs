//! Pipeline builder.
//!
//! [`Connection::exec_pipeline`](crate::Connection::exec_pipeline) hands a
//! `Pipeline` to the caller's closure; every pushed query is transmitted in
//! push order after the closure returns, and results come back one per push
//! in the same order.

use crate::error::Result;
use crate::oid_map::OidMap;
use crate::params::{Params, ToParams};

/// Type-erased parameter pack of one queued query.
///
/// Parameters are held unencoded until the connection has resolved any
/// user-defined types they mention; encoding happens once, against the
/// updated map, before any bytes are submitted.
pub(crate) trait EncodeParams {
    fn collect_new_udts(&self, map: &OidMap, out: &mut Vec<&'static str>);
    fn encode(&self, map: &OidMap) -> Result<Params>;
}

impl<P: ToParams> EncodeParams for P {
    fn collect_new_udts(&self, map: &OidMap, out: &mut Vec<&'static str>) {
        ToParams::collect_new_udts(self, map, out);
    }

    fn encode(&self, map: &OidMap) -> Result<Params> {
        Params::build(map, self)
    }
}

pub(crate) struct QueuedQuery<'q> {
    pub query: String,
    pub params: Box<dyn EncodeParams + 'q>,
}

/// Builder collecting the queries of one pipelined batch.
#[derive(Default)]
pub struct Pipeline<'q> {
    pub(crate) items: Vec<QueuedQuery<'q>>,
}

impl<'q> Pipeline<'q> {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Queue a query without parameters.
    pub fn push(&mut self, query: impl Into<String>) {
        self.push_params(query, ());
    }

    /// Queue a query with a typed parameter pack.
    pub fn push_params<P: ToParams + 'q>(&mut self, query: impl Into<String>, params: P) {
        self.items.push(QueuedQuery {
            query: query.into(),
            params: Box::new(params),
        });
    }

    /// Number of queued queries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
