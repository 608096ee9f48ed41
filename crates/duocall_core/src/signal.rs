/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Signaling channel seam.
//!
//! Wraps whatever shared document store carries the handshake into a small pub/sub
//! surface: one session record per call plus two append-only candidate logs. Every
//! operation is remote and asynchronous; implementations report failures as
//! [`CallError::ChannelUnavailable`] with the backend error attached as source.

use async_trait::async_trait;
use duocall_protocol::{CandidateInit, CandidateLog, SessionDescription, SessionRecord};
use tokio::sync::mpsc;

use crate::error::CallError;

/// Stream of session record snapshots. The first delivery is the current state at
/// subscription time (`None` when the record does not exist yet); afterwards one
/// snapshot per change, with `None` meaning the record was deleted. Dropping the watch
/// unsubscribes.
pub struct SessionWatch {
    rx: mpsc::UnboundedReceiver<Option<SessionRecord>>,
}

impl SessionWatch {
    pub fn new(rx: mpsc::UnboundedReceiver<Option<SessionRecord>>) -> Self {
        Self { rx }
    }

    /// Next snapshot, or `None` when the channel itself went away.
    pub async fn recv(&mut self) -> Option<Option<SessionRecord>> {
        self.rx.recv().await
    }
}

/// Stream of additions to one candidate log: each candidate exactly once, in
/// server-assigned order, starting with any entries appended before the subscription.
/// Dropping the watch unsubscribes.
pub struct CandidateWatch {
    rx: mpsc::UnboundedReceiver<CandidateInit>,
}

impl CandidateWatch {
    pub fn new(rx: mpsc::UnboundedReceiver<CandidateInit>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<CandidateInit> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait SignalChannel: Send + Sync + 'static {
    /// Creates the shared session record if absent (upsert; never clobbers fields an
    /// earlier writer already merged in). Idempotent.
    async fn create_session(&self, id: &str) -> Result<(), CallError>;

    /// Merges the offer into the session record, creating it if needed.
    async fn publish_offer(&self, id: &str, desc: SessionDescription) -> Result<(), CallError>;

    /// Merges the answer into the session record, creating it if needed.
    async fn publish_answer(&self, id: &str, desc: SessionDescription) -> Result<(), CallError>;

    /// Subscribes to all changes of the session record.
    async fn watch_session(&self, id: &str) -> Result<SessionWatch, CallError>;

    /// Appends a candidate to the log identified by `log`.
    async fn append_candidate(
        &self,
        id: &str,
        log: CandidateLog,
        cand: CandidateInit,
    ) -> Result<(), CallError>;

    /// Subscribes to additions in the given log.
    async fn watch_candidates(&self, id: &str, log: CandidateLog)
        -> Result<CandidateWatch, CallError>;

    /// Removes the session record and both candidate logs. Deleting a nonexistent
    /// session is not an error. Record removal is the peer's end-of-call signal.
    async fn delete_session(&self, id: &str) -> Result<(), CallError>;
}
