/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Two-party call signaling and lifecycle controller.
//!
//! Establishes a direct audio/video session between two parties using a slow,
//! asynchronous, shared document store as the only signaling transport. The store and
//! the media engine are injected behind traits ([`signal::SignalChannel`],
//! [`engine::ConnectionEngine`]); [`call::start_call`] drives the offer/answer/candidate
//! exchange and guarantees teardown of media devices, the connection and the shared
//! signaling records.

pub mod call;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory_signal;
pub mod signal;
pub mod webrtc_engine;

#[cfg(test)]
pub(crate) mod testutil;

pub use call::{start_call, CallEvent, CallHandle, CallOptions, CallPhase, CallRole};
pub use config::CallConfig;
pub use error::{CallError, CallErrorKind};

/// Generates a session id suitable for sharing with the peer out-of-band.
pub fn random_session_id() -> String {
    let mut b = [0u8; 16];
    use rand::RngCore as _;
    rand::rngs::OsRng.fill_bytes(&mut b);
    b.iter().map(|v| format!("{v:02x}")).collect()
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
