/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::time::Duration;

/// Call controller configuration. All fields are optional; accessors clamp to sane
/// ranges so a hostile or stale config cannot wedge a call forever.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct CallConfig {
    /// ICE server URLs (e.g. `stun:stun.l.google.com:19302`,
    /// `turn:turn.example:3478?transport=udp`).
    pub ice_urls: Option<Vec<String>>,
    /// Optional ICE username (TURN).
    pub ice_username: Option<String>,
    /// Optional ICE credential (TURN).
    pub ice_credential: Option<String>,
    /// Seconds to wait for the peer's description (answer for the initiator, offer for
    /// the responder) before giving up.
    pub exchange_timeout_secs: Option<u64>,
    /// Seconds from description exchange complete until the transport must report
    /// connected.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_urls: Some(vec!["stun:stun.l.google.com:19302".to_string()]),
            ice_username: None,
            ice_credential: None,
            exchange_timeout_secs: Some(45),
            connect_timeout_secs: Some(30),
        }
    }
}

impl CallConfig {
    pub fn ice_urls(&self) -> Vec<String> {
        self.ice_urls.clone().unwrap_or_default()
    }

    pub fn ice_username(&self) -> Option<String> {
        self.ice_username
            .clone()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn ice_credential(&self) -> Option<String> {
        self.ice_credential
            .clone()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs.unwrap_or(45).max(5).min(300))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(30).max(5).min(120))
    }
}
