/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::Serialize;

/// Failures surfaced by the call controller.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Capture devices unavailable or permission refused. Fatal before any signaling
    /// write happens, so no remote cleanup is needed beyond releasing local resources.
    #[error("camera or microphone unavailable: {0}")]
    MediaDenied(String),

    /// The signal store rejected or lost an operation. Fatal during setup; during an
    /// established exchange candidate publication degrades to a logged warning instead.
    #[error("signaling channel unavailable")]
    ChannelUnavailable(#[source] anyhow::Error),

    /// The connection engine failed or reported a failed transport.
    #[error("connection engine failure: {0}")]
    Engine(String),

    /// A bounded wait expired (answer never arrived, or transport never connected).
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl CallError {
    pub fn kind(&self) -> CallErrorKind {
        match self {
            CallError::MediaDenied(_) => CallErrorKind::MediaDenied,
            CallError::ChannelUnavailable(_) => CallErrorKind::ChannelUnavailable,
            CallError::Engine(_) => CallErrorKind::Engine,
            CallError::Timeout(_) => CallErrorKind::Timeout,
        }
    }
}

/// Cloneable projection of [`CallError`] carried in UI-facing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    MediaDenied,
    ChannelUnavailable,
    Engine,
    Timeout,
}
