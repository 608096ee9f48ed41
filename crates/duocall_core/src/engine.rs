/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Connection engine seam.
//!
//! The media/connectivity capability (capture, negotiation, packet transport) sits
//! behind these traits so the call state machine can be driven against the production
//! webrtc binding or an in-process fake. Engine callbacks are folded into a single
//! [`EngineEvent`] channel, preserving their ordering against signaling events.

use async_trait::async_trait;
use duocall_protocol::{CandidateInit, SessionDescription};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CallError;

/// Transport state reported by the engine. [`LinkState::Connected`] is the only state
/// that advances the call; the terminal states end it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LinkState::Disconnected | LinkState::Failed | LinkState::Closed)
    }
}

/// Descriptor of a remote media track the engine started receiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteTrackInfo {
    pub id: String,
    /// `"audio"` or `"video"`.
    pub kind: String,
}

/// Everything the engine reports asynchronously, on its own schedule.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A locally discovered connectivity candidate, to be published to our own log.
    LocalCandidate(CandidateInit),
    /// Remote media arrived and is flowing.
    RemoteTrack(RemoteTrackInfo),
    /// Transport state change.
    StateChanged(LinkState),
}

/// Handle to active capture hardware. Stopping must release the devices and is
/// idempotent.
#[async_trait]
pub trait LocalMedia: Send + 'static {
    async fn stop(&mut self);
}

#[async_trait]
pub trait ConnectionEngine: Send + Sync + 'static {
    type Media: LocalMedia;
    type Connection: EngineConnection<Media = Self::Media>;

    /// Activates camera/microphone. Fails with [`CallError::MediaDenied`] when devices
    /// are unavailable or permission is refused.
    async fn acquire_local_media(&self) -> Result<Self::Media, CallError>;

    /// Creates a connection configured with the engine's connectivity-discovery servers.
    /// All events for this connection are delivered through `events`.
    async fn create_connection(
        &self,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Self::Connection, CallError>;
}

#[async_trait]
pub trait EngineConnection: Send + Sync + 'static {
    type Media: LocalMedia;

    /// Binds every local track to the connection for outbound transport.
    async fn attach_local_media(&self, media: &Self::Media) -> Result<(), CallError>;

    /// Creates an offer and sets it as the connection's local description.
    async fn create_offer(&self) -> Result<SessionDescription, CallError>;

    /// Creates an answer and sets it as the connection's local description.
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;

    /// Applies the peer's description. A duplicate remote description is a guarded
    /// no-op, and any candidates buffered before this call are applied afterwards.
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), CallError>;

    /// Queues or applies a connectivity candidate. Must tolerate candidates arriving
    /// before the remote description by buffering them internally.
    async fn add_remote_candidate(&self, cand: CandidateInit) -> Result<(), CallError>;

    /// Releases all transport resources. Idempotent.
    async fn close(&self);
}
