/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! In-memory signal store.
//!
//! Reference implementation of [`SignalChannel`] with the same observable semantics a
//! backed store must provide: upsert-by-merge on the session record, an immediate
//! snapshot on subscription, ordered exactly-once candidate delivery with catch-up,
//! and idempotent deletion that notifies every record watcher. Used directly in tests
//! and as the template for real store adapters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duocall_protocol::{CandidateInit, CandidateLog, SessionDescription, SessionRecord};
use tokio::sync::mpsc;

use crate::error::CallError;
use crate::now_ms;
use crate::signal::{CandidateWatch, SessionWatch, SignalChannel};

#[derive(Default)]
struct LogSlot {
    entries: Vec<CandidateInit>,
    watchers: Vec<mpsc::UnboundedSender<CandidateInit>>,
}

#[derive(Default)]
struct Slot {
    record: Option<SessionRecord>,
    watchers: Vec<mpsc::UnboundedSender<Option<SessionRecord>>>,
    offerer: LogSlot,
    answerer: LogSlot,
}

impl Slot {
    fn log_mut(&mut self, log: CandidateLog) -> &mut LogSlot {
        match log {
            CandidateLog::Offerer => &mut self.offerer,
            CandidateLog::Answerer => &mut self.answerer,
        }
    }

    fn notify_record(&mut self) {
        let snapshot = self.record.clone();
        // Dropped receivers unsubscribe; prune them as we go.
        self.watchers.retain(|w| w.send(snapshot.clone()).is_ok());
    }
}

/// Process-local [`SignalChannel`] backed by a map of session slots.
#[derive(Clone, Default)]
pub struct MemorySignalChannel {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemorySignalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current record, for inspection.
    pub fn session_record(&self, id: &str) -> Option<SessionRecord> {
        let slots = self.slots.lock().expect("slots mutex");
        slots.get(id).and_then(|s| s.record.clone())
    }

    /// Number of entries currently in a candidate log, for inspection.
    pub fn candidate_count(&self, id: &str, log: CandidateLog) -> usize {
        let mut slots = self.slots.lock().expect("slots mutex");
        slots.get_mut(id).map(|s| s.log_mut(log).entries.len()).unwrap_or(0)
    }

    fn merge_description(&self, id: &str, log: CandidateLog, desc: SessionDescription) {
        let mut slots = self.slots.lock().expect("slots mutex");
        let slot = slots.entry(id.to_string()).or_default();
        let record = slot.record.get_or_insert_with(|| SessionRecord {
            created_at_ms: now_ms(),
            ..Default::default()
        });
        match log {
            CandidateLog::Offerer => record.offer = Some(desc),
            CandidateLog::Answerer => record.answer = Some(desc),
        }
        slot.notify_record();
    }
}

#[async_trait]
impl SignalChannel for MemorySignalChannel {
    async fn create_session(&self, id: &str) -> Result<(), CallError> {
        let mut slots = self.slots.lock().expect("slots mutex");
        let slot = slots.entry(id.to_string()).or_default();
        if slot.record.is_none() {
            slot.record = Some(SessionRecord { created_at_ms: now_ms(), ..Default::default() });
            slot.notify_record();
        }
        Ok(())
    }

    async fn publish_offer(&self, id: &str, desc: SessionDescription) -> Result<(), CallError> {
        self.merge_description(id, CandidateLog::Offerer, desc);
        Ok(())
    }

    async fn publish_answer(&self, id: &str, desc: SessionDescription) -> Result<(), CallError> {
        self.merge_description(id, CandidateLog::Answerer, desc);
        Ok(())
    }

    async fn watch_session(&self, id: &str) -> Result<SessionWatch, CallError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.slots.lock().expect("slots mutex");
        let slot = slots.entry(id.to_string()).or_default();
        // Initial snapshot fires immediately, then one per change.
        let _ = tx.send(slot.record.clone());
        slot.watchers.push(tx);
        Ok(SessionWatch::new(rx))
    }

    async fn append_candidate(
        &self,
        id: &str,
        log: CandidateLog,
        cand: CandidateInit,
    ) -> Result<(), CallError> {
        let mut slots = self.slots.lock().expect("slots mutex");
        let slot = slots.entry(id.to_string()).or_default();
        let log_slot = slot.log_mut(log);
        log_slot.entries.push(cand.clone());
        log_slot.watchers.retain(|w| w.send(cand.clone()).is_ok());
        Ok(())
    }

    async fn watch_candidates(
        &self,
        id: &str,
        log: CandidateLog,
    ) -> Result<CandidateWatch, CallError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.slots.lock().expect("slots mutex");
        let slot = slots.entry(id.to_string()).or_default();
        let log_slot = slot.log_mut(log);
        // Catch up on entries appended before the subscription, then stream additions.
        for entry in &log_slot.entries {
            let _ = tx.send(entry.clone());
        }
        log_slot.watchers.push(tx);
        Ok(CandidateWatch::new(rx))
    }

    async fn delete_session(&self, id: &str) -> Result<(), CallError> {
        let mut slots = self.slots.lock().expect("slots mutex");
        let Some(mut slot) = slots.remove(id) else {
            return Ok(());
        };
        slot.record = None;
        slot.notify_record();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_session_fires_initial_snapshot() {
        let ch = MemorySignalChannel::new();
        let mut w = ch.watch_session("s1").await.expect("watch");
        assert_eq!(w.recv().await, Some(None));

        ch.create_session("s1").await.expect("create");
        let snap = w.recv().await.expect("snapshot").expect("record");
        assert!(snap.offer.is_none());
        assert!(snap.created_at_ms > 0);
    }

    #[tokio::test]
    async fn publish_merges_without_clobbering() {
        let ch = MemorySignalChannel::new();
        ch.create_session("s1").await.expect("create");
        ch.publish_offer("s1", SessionDescription::offer("sdp-o")).await.expect("offer");
        // create_session again must not wipe the offer.
        ch.create_session("s1").await.expect("create again");
        ch.publish_answer("s1", SessionDescription::answer("sdp-a")).await.expect("answer");

        let rec = ch.session_record("s1").expect("record");
        assert_eq!(rec.offer.expect("offer").sdp, "sdp-o");
        assert_eq!(rec.answer.expect("answer").sdp, "sdp-a");
    }

    #[tokio::test]
    async fn candidates_catch_up_then_stream_in_order() {
        let ch = MemorySignalChannel::new();
        let c = |s: &str| CandidateInit {
            candidate: s.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        ch.append_candidate("s1", CandidateLog::Offerer, c("a")).await.expect("append");
        ch.append_candidate("s1", CandidateLog::Offerer, c("b")).await.expect("append");

        let mut w = ch.watch_candidates("s1", CandidateLog::Offerer).await.expect("watch");
        ch.append_candidate("s1", CandidateLog::Offerer, c("c")).await.expect("append");

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(w.recv().await.expect("candidate").candidate);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        // The other log stays untouched.
        assert_eq!(ch.candidate_count("s1", CandidateLog::Answerer), 0);
    }

    #[tokio::test]
    async fn delete_notifies_watchers_and_is_idempotent() {
        let ch = MemorySignalChannel::new();
        ch.create_session("s1").await.expect("create");
        let mut w = ch.watch_session("s1").await.expect("watch");
        assert!(w.recv().await.expect("initial").is_some());

        ch.delete_session("s1").await.expect("delete");
        assert_eq!(w.recv().await, Some(None));
        assert!(ch.session_record("s1").is_none());

        // Concurrent end-of-call: both parties may delete; the second is a no-op.
        ch.delete_session("s1").await.expect("delete again");
    }
}
