//! Per-call context.
//!
//! A [`CallContext`] carries what a call needs besides its payload: the
//! metadata received at ingress (read-only), the metadata to attach to calls
//! issued on its behalf, a deadline and a trace id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::metadata::Metadata;

/// Header carrying the trace id of a call
pub const TRACE_ID_HEADER: &str = "traceid";
/// Reserved header carrying the application status code
pub const STATUS_CODE_HEADER: &str = "statuscode";
/// Reserved header carrying the application status message
pub const STATUS_MSG_HEADER: &str = "statusmsg";

static TRACE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh trace id: 32 hex chars.
///
/// The first half is the wall clock in nanoseconds. The second half is 32
/// random bits followed by a process-wide counter, so ids from processes
/// started at the same moment still differ.
pub fn generate_trace_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let counter = TRACE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::random();
    format!(
        "{:016x}{:08x}{:08x}",
        timestamp,
        salt,
        counter & 0xFFFF_FFFF
    )
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    incoming: Arc<Metadata>,
    outgoing: Metadata,
    deadline: Option<Instant>,
    trace_id: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a call that arrived with `incoming` metadata.
    pub fn with_incoming(mut self, incoming: Metadata) -> Self {
        self.incoming = Arc::new(incoming);
        self
    }

    /// Sets the deadline `timeout` from now. An earlier deadline wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Unions `md` into the outgoing metadata.
    pub fn append_outgoing(&mut self, md: &Metadata) -> &mut Self {
        self.outgoing = self.outgoing.merge(md);
        self
    }

    pub fn incoming(&self) -> &Metadata {
        &self.incoming
    }

    pub fn outgoing(&self) -> &Metadata {
        &self.outgoing
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn incoming_token(&self) -> Option<&str> {
        self.incoming.token()
    }

    pub fn outgoing_token(&self) -> Option<&str> {
        self.outgoing.token()
    }

    pub fn incoming_ldap(&self) -> Option<&str> {
        self.incoming.ldap()
    }
}
