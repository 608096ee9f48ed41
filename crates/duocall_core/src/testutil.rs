/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Test doubles: an engine that reports connected once both descriptions are set, and a
//! signal channel that can be made to fail candidate appends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duocall_protocol::{CandidateInit, CandidateLog, SessionDescription};
use tokio::sync::mpsc;

use crate::call::{CallEvent, CallPhase};
use crate::engine::{
    ConnectionEngine, EngineConnection, EngineEvent, LinkState, LocalMedia,
};
use crate::error::CallError;
use crate::memory_signal::MemorySignalChannel;
use crate::signal::{CandidateWatch, SessionWatch, SignalChannel};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Default)]
pub struct FakeShared {
    pub local_set: AtomicBool,
    pub remote_applied: AtomicUsize,
    pub duplicate_remotes: AtomicUsize,
    pub received_candidates: Mutex<Vec<CandidateInit>>,
    pub close_calls: AtomicUsize,
    pub media_stop_calls: AtomicUsize,
    connected_sent: AtomicBool,
}

pub struct FakeEngine {
    pub deny_media: bool,
    /// Candidate strings trickled out after the local description is set.
    pub trickle: Vec<String>,
    /// When false the transport never reports connected (timeout scenarios).
    pub connect_when_ready: bool,
    pub shared: Arc<FakeShared>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            deny_media: false,
            trickle: Vec::new(),
            connect_when_ready: true,
            shared: Arc::new(FakeShared::default()),
        }
    }

    pub fn with_trickle(candidates: &[&str]) -> Self {
        let mut e = Self::new();
        e.trickle = candidates.iter().map(|s| s.to_string()).collect();
        e
    }

    pub fn denying_media() -> Self {
        let mut e = Self::new();
        e.deny_media = true;
        e
    }

    pub fn never_connecting() -> Self {
        let mut e = Self::new();
        e.connect_when_ready = false;
        e
    }
}

pub struct FakeMedia {
    shared: Arc<FakeShared>,
    stopped: bool,
}

#[async_trait]
impl LocalMedia for FakeMedia {
    async fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.shared.media_stop_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct FakeConnection {
    shared: Arc<FakeShared>,
    events: mpsc::Sender<EngineEvent>,
    trickle: Vec<String>,
    connect_when_ready: bool,
}

impl FakeConnection {
    async fn emit_trickle(&self) {
        for c in &self.trickle {
            let _ = self
                .events
                .send(EngineEvent::LocalCandidate(CandidateInit {
                    candidate: c.clone(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                }))
                .await;
        }
    }

    async fn maybe_connected(&self) {
        if !self.connect_when_ready {
            return;
        }
        if self.shared.local_set.load(Ordering::SeqCst)
            && self.shared.remote_applied.load(Ordering::SeqCst) > 0
            && !self.shared.connected_sent.swap(true, Ordering::SeqCst)
        {
            let _ = self.events.send(EngineEvent::StateChanged(LinkState::Connected)).await;
        }
    }
}

#[async_trait]
impl EngineConnection for FakeConnection {
    type Media = FakeMedia;

    async fn attach_local_media(&self, _media: &FakeMedia) -> Result<(), CallError> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        self.shared.local_set.store(true, Ordering::SeqCst);
        self.emit_trickle().await;
        self.maybe_connected().await;
        Ok(SessionDescription::offer("v=0 fake-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        self.shared.local_set.store(true, Ordering::SeqCst);
        self.emit_trickle().await;
        self.maybe_connected().await;
        Ok(SessionDescription::answer("v=0 fake-answer"))
    }

    async fn set_remote_description(&self, _desc: SessionDescription) -> Result<(), CallError> {
        if self.shared.remote_applied.load(Ordering::SeqCst) > 0 {
            self.shared.duplicate_remotes.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.shared.remote_applied.fetch_add(1, Ordering::SeqCst);
        self.maybe_connected().await;
        Ok(())
    }

    async fn add_remote_candidate(&self, cand: CandidateInit) -> Result<(), CallError> {
        self.shared.received_candidates.lock().expect("candidates mutex").push(cand);
        Ok(())
    }

    async fn close(&self) {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionEngine for FakeEngine {
    type Media = FakeMedia;
    type Connection = FakeConnection;

    async fn acquire_local_media(&self) -> Result<FakeMedia, CallError> {
        if self.deny_media {
            return Err(CallError::MediaDenied("denied by test".to_string()));
        }
        Ok(FakeMedia { shared: self.shared.clone(), stopped: false })
    }

    async fn create_connection(
        &self,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<FakeConnection, CallError> {
        Ok(FakeConnection {
            shared: self.shared.clone(),
            events,
            trickle: self.trickle.clone(),
            connect_when_ready: self.connect_when_ready,
        })
    }
}

/// Memory channel whose candidate appends can be made to fail, for exercising the
/// non-fatal `ChannelUnavailable` path.
#[derive(Default)]
pub struct FlakyChannel {
    pub inner: MemorySignalChannel,
    pub fail_appends: AtomicBool,
}

#[async_trait]
impl SignalChannel for FlakyChannel {
    async fn create_session(&self, id: &str) -> Result<(), CallError> {
        self.inner.create_session(id).await
    }

    async fn publish_offer(&self, id: &str, desc: SessionDescription) -> Result<(), CallError> {
        self.inner.publish_offer(id, desc).await
    }

    async fn publish_answer(&self, id: &str, desc: SessionDescription) -> Result<(), CallError> {
        self.inner.publish_answer(id, desc).await
    }

    async fn watch_session(&self, id: &str) -> Result<SessionWatch, CallError> {
        self.inner.watch_session(id).await
    }

    async fn append_candidate(
        &self,
        id: &str,
        log: CandidateLog,
        cand: CandidateInit,
    ) -> Result<(), CallError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(CallError::ChannelUnavailable(anyhow::anyhow!("store offline")));
        }
        self.inner.append_candidate(id, log, cand).await
    }

    async fn watch_candidates(
        &self,
        id: &str,
        log: CandidateLog,
    ) -> Result<CandidateWatch, CallError> {
        self.inner.watch_candidates(id, log).await
    }

    async fn delete_session(&self, id: &str) -> Result<(), CallError> {
        self.inner.delete_session(id).await
    }
}

/// Drains events until the next phase change.
pub async fn next_phase(rx: &mut mpsc::Receiver<CallEvent>) -> Option<CallPhase> {
    while let Some(ev) = rx.recv().await {
        if let CallEvent::Phase(p) = ev {
            return Some(p);
        }
    }
    None
}

/// Drains events until the wanted phase shows up; panics if the stream ends first.
pub async fn wait_for_phase(rx: &mut mpsc::Receiver<CallEvent>, want: CallPhase) {
    while let Some(p) = next_phase(rx).await {
        if p == want {
            return;
        }
    }
    panic!("event stream ended before reaching {want:?}");
}

/// Drains the remaining events and returns the last phase observed.
pub async fn final_phase(rx: &mut mpsc::Receiver<CallEvent>) -> Option<CallPhase> {
    let mut last = None;
    while let Some(p) = next_phase(rx).await {
        last = Some(p);
    }
    last
}

pub fn candidate_strings(shared: &FakeShared) -> Vec<String> {
    shared
        .received_candidates
        .lock()
        .expect("candidates mutex")
        .iter()
        .map(|c| c.candidate.clone())
        .collect()
}
