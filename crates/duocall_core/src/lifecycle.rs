/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Exactly-once cleanup of everything a call holds: capture hardware, the engine
//! connection, and the shared signaling records.
//!
//! Resources are registered as they come into existence, so teardown is safe from any
//! partially-initialized state. Deleting the session record is the peer's end-of-call
//! signal and therefore happens last.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::{ConnectionEngine, EngineConnection, LocalMedia};
use crate::signal::SignalChannel;

pub struct SessionLifecycle<E: ConnectionEngine, S: SignalChannel> {
    channel: Arc<S>,
    session_id: String,
    media: Option<E::Media>,
    connection: Option<Arc<E::Connection>>,
    signaling_started: bool,
    torn_down: bool,
}

impl<E: ConnectionEngine, S: SignalChannel> SessionLifecycle<E, S> {
    pub fn new(channel: Arc<S>, session_id: String) -> Self {
        Self {
            channel,
            session_id,
            media: None,
            connection: None,
            signaling_started: false,
            torn_down: false,
        }
    }

    pub fn set_media(&mut self, media: E::Media) {
        self.media = Some(media);
    }

    pub fn set_connection(&mut self, connection: Arc<E::Connection>) {
        self.connection = Some(connection);
    }

    /// Marks that signaling writes or subscriptions have begun; only then does teardown
    /// touch the shared record. A pre-media failure must leave the store untouched.
    pub fn mark_signaling(&mut self) {
        self.signaling_started = true;
    }

    /// Releases everything once. Subsequent invocations are no-ops.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            debug!(session = %self.session_id, "teardown already ran");
            return;
        }
        self.torn_down = true;

        if let Some(mut media) = self.media.take() {
            media.stop().await;
        }
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        if self.signaling_started {
            // Both parties may race to delete; deletion is idempotent, so losing the
            // race is fine.
            if let Err(e) = self.channel.delete_session(&self.session_id).await {
                warn!(session = %self.session_id, error = %e, "session record deletion failed");
            }
        }
        debug!(session = %self.session_id, "call resources released");
    }
}
