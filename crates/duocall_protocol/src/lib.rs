/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Record shapes shared between call participants and signal store implementations.
//!
//! Everything here is opaque to the signaling layer: descriptions and candidates are
//! carried as strings and interpreted only by the connection engine.

use serde::{Deserialize, Serialize};

/// An offer or answer exchanged to negotiate a direct connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// `"offer"` or `"answer"`.
    pub kind: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: "offer".to_string(), sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: "answer".to_string(), sdp: sdp.into() }
    }
}

/// One possible network path endpoint, exchanged trickle-style as discovered.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
}

/// The shared per-call document: one record per session id, written by both parties.
///
/// The initiator merges in `offer`, the responder merges in `answer`; whichever party
/// ends the call deletes the record.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    #[serde(default)]
    pub offer: Option<SessionDescription>,
    #[serde(default)]
    pub answer: Option<SessionDescription>,
    #[serde(default)]
    pub created_at_ms: i64,
}

/// Identifies one of the two append-only candidate logs scoped to a session.
///
/// A party only ever writes to its own log and only ever reads the peer's log.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateLog {
    Offerer,
    Answerer,
}

impl CandidateLog {
    pub fn peer(self) -> Self {
        match self {
            CandidateLog::Offerer => CandidateLog::Answerer,
            CandidateLog::Answerer => CandidateLog::Offerer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CandidateLog::Offerer => "offerer",
            CandidateLog::Answerer => "answerer",
        }
    }
}
