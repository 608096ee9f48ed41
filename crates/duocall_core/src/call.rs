/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The call state machine.
//!
//! One driver task per call multiplexes the session record watch, the inbound
//! candidate watch, the engine event channel, the hang-up command channel and two
//! deadlines. Watches are established strictly before descriptions are published or
//! consumed, so candidates the peer starts trickling the moment it sees a description
//! are never lost. Every exit path, including errors and the caller abandoning the
//! handle, runs the same teardown.

use std::sync::Arc;

use anyhow::anyhow;
use duocall_protocol::CandidateLog;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::config::CallConfig;
use crate::engine::{ConnectionEngine, EngineConnection, EngineEvent, LinkState, RemoteTrackInfo};
use crate::error::{CallError, CallErrorKind};
use crate::lifecycle::SessionLifecycle;
use crate::signal::SignalChannel;

/// Which side of the handshake the local party plays. The initiator creates the offer,
/// the responder the answer; the caller picks exactly one side out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallRole {
    Initiator,
    Responder,
}

impl CallRole {
    /// The candidate log this party writes to.
    pub fn own_log(self) -> CandidateLog {
        match self {
            CallRole::Initiator => CandidateLog::Offerer,
            CallRole::Responder => CandidateLog::Answerer,
        }
    }

    /// The candidate log this party reads from.
    pub fn peer_log(self) -> CandidateLog {
        self.own_log().peer()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "error")]
pub enum CallPhase {
    Idle,
    AcquiringMedia,
    Offering,
    AwaitingOffer,
    AwaitingAnswer,
    Answering,
    Connected,
    Ended,
    Failed(CallErrorKind),
}

/// What the UI layer receives while a call runs.
#[derive(Debug, Clone)]
pub enum CallEvent {
    Phase(CallPhase),
    RemoteTrack(RemoteTrackInfo),
}

#[derive(Debug)]
enum CallCommand {
    HangUp,
}

#[derive(Debug, Clone)]
pub struct CallOptions {
    pub session_id: String,
    pub role: CallRole,
}

impl CallOptions {
    pub fn new(session_id: impl Into<String>, role: CallRole) -> Self {
        Self { session_id: session_id.into(), role }
    }
}

/// Control handle for a running call. Dropping it hangs up, so abandoning the call
/// screen takes the same cleanup path as an explicit hang-up.
pub struct CallHandle {
    cmd_tx: mpsc::Sender<CallCommand>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl CallHandle {
    pub async fn hang_up(&self) {
        let _ = self.cmd_tx.send(CallCommand::HangUp).await;
    }

    /// Waits until the driver task has finished tearing the call down.
    pub async fn finished(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(CallCommand::HangUp);
    }
}

struct PhaseEmitter {
    events: mpsc::Sender<CallEvent>,
    phase: CallPhase,
}

impl PhaseEmitter {
    async fn set(&mut self, phase: CallPhase) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        // A UI that stopped listening does not stall the driver.
        let _ = self.events.send(CallEvent::Phase(phase)).await;
    }
}

/// Starts a call and returns its control handle plus the event stream for the UI.
pub fn start_call<E, S>(
    engine: Arc<E>,
    channel: Arc<S>,
    config: CallConfig,
    opts: CallOptions,
) -> (CallHandle, mpsc::Receiver<CallEvent>)
where
    E: ConnectionEngine,
    S: SignalChannel,
{
    let (event_tx, event_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let join = tokio::spawn(run_call(engine, channel, config, opts, event_tx, cmd_rx));
    (CallHandle { cmd_tx, join: Some(join) }, event_rx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    HungUp,
    PeerEnded,
    TransportClosed,
}

async fn run_call<E, S>(
    engine: Arc<E>,
    channel: Arc<S>,
    config: CallConfig,
    opts: CallOptions,
    events: mpsc::Sender<CallEvent>,
    cmd_rx: mpsc::Receiver<CallCommand>,
) where
    E: ConnectionEngine,
    S: SignalChannel,
{
    let session_id = opts.session_id.clone();
    let mut lifecycle: SessionLifecycle<E, S> =
        SessionLifecycle::new(channel.clone(), session_id.clone());
    let mut emitter = PhaseEmitter { events, phase: CallPhase::Idle };

    match drive(&engine, &channel, &config, &opts, &mut lifecycle, &mut emitter, cmd_rx).await {
        Ok(reason) => {
            info!(session = %session_id, ?reason, "call ended");
        }
        Err(e) => {
            warn!(session = %session_id, error = %e, "call failed");
            emitter.set(CallPhase::Failed(e.kind())).await;
        }
    }

    lifecycle.teardown().await;
    if !matches!(emitter.phase, CallPhase::Failed(_)) {
        emitter.set(CallPhase::Ended).await;
    }
}

async fn drive<E, S>(
    engine: &Arc<E>,
    channel: &Arc<S>,
    config: &CallConfig,
    opts: &CallOptions,
    lifecycle: &mut SessionLifecycle<E, S>,
    emitter: &mut PhaseEmitter,
    mut cmd_rx: mpsc::Receiver<CallCommand>,
) -> Result<EndReason, CallError>
where
    E: ConnectionEngine,
    S: SignalChannel,
{
    let session_id = opts.session_id.as_str();

    emitter.set(CallPhase::AcquiringMedia).await;
    let media = engine.acquire_local_media().await?;

    let (engine_tx, mut engine_rx) = mpsc::channel(64);
    let conn = Arc::new(engine.create_connection(engine_tx).await?);
    lifecycle.set_connection(conn.clone());
    let attached = conn.attach_local_media(&media).await;
    lifecycle.set_media(media);
    attached?;

    // Both watches go up before any description is published or consumed: the peer may
    // start trickling candidates the instant it sees our description, and a late
    // subscription would silently drop those.
    lifecycle.mark_signaling();
    let mut session_watch = channel.watch_session(session_id).await?;
    let mut cand_watch = channel.watch_candidates(session_id, opts.role.peer_log()).await?;

    match opts.role {
        CallRole::Initiator => {
            emitter.set(CallPhase::Offering).await;
            channel.create_session(session_id).await?;
            let offer = conn.create_offer().await?;
            channel.publish_offer(session_id, offer).await?;
            emitter.set(CallPhase::AwaitingAnswer).await;
        }
        CallRole::Responder => {
            emitter.set(CallPhase::AwaitingOffer).await;
        }
    }

    let mut seen_record = false;
    let mut exchange_done = false;
    let mut connected = false;
    let mut cand_closed = false;
    let exchange_deadline = Instant::now() + config.exchange_timeout();
    let mut connect_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                // Handle dropped (None) and explicit hang-up take the same path.
                let _ = cmd;
                return Ok(EndReason::HungUp);
            }

            snap = session_watch.recv() => match snap {
                None => {
                    return Err(CallError::ChannelUnavailable(anyhow!("session watch closed")));
                }
                Some(None) => {
                    if seen_record {
                        // The peer deleted the record: the call is over.
                        return Ok(EndReason::PeerEnded);
                    }
                }
                Some(Some(record)) => {
                    seen_record = true;
                    match opts.role {
                        CallRole::Initiator => {
                            if let Some(answer) = record.answer {
                                if exchange_done {
                                    // A second answer write is stale; ignore it.
                                    debug!(session = %session_id, "stale answer ignored");
                                } else {
                                    conn.set_remote_description(answer).await?;
                                    exchange_done = true;
                                    if !connected {
                                        connect_deadline =
                                            Some(Instant::now() + config.connect_timeout());
                                    }
                                }
                            }
                        }
                        CallRole::Responder => {
                            if !exchange_done && record.answer.is_none() {
                                if let Some(offer) = record.offer {
                                    emitter.set(CallPhase::Answering).await;
                                    conn.set_remote_description(offer).await?;
                                    let answer = conn.create_answer().await?;
                                    channel.publish_answer(session_id, answer).await?;
                                    exchange_done = true;
                                    if !connected {
                                        connect_deadline =
                                            Some(Instant::now() + config.connect_timeout());
                                    }
                                }
                            }
                        }
                    }
                }
            },

            cand = cand_watch.recv(), if !cand_closed => match cand {
                Some(c) => {
                    // The binding buffers candidates that beat the remote description.
                    conn.add_remote_candidate(c).await?;
                }
                None => {
                    debug!(session = %session_id, "candidate watch ended");
                    cand_closed = true;
                }
            },

            ev = engine_rx.recv() => match ev {
                Some(EngineEvent::LocalCandidate(c)) => {
                    if let Err(e) = channel
                        .append_candidate(session_id, opts.role.own_log(), c)
                        .await
                    {
                        // Non-fatal: the store reconnects on its own and candidates
                        // keep flowing once it does.
                        warn!(session = %session_id, error = %e, "candidate publication failed");
                    }
                }
                Some(EngineEvent::RemoteTrack(track)) => {
                    let _ = emitter.events.send(CallEvent::RemoteTrack(track)).await;
                }
                Some(EngineEvent::StateChanged(LinkState::Connected)) => {
                    connected = true;
                    connect_deadline = None;
                    emitter.set(CallPhase::Connected).await;
                }
                Some(EngineEvent::StateChanged(LinkState::Failed)) => {
                    return Err(CallError::Engine("transport failed".to_string()));
                }
                Some(EngineEvent::StateChanged(st)) if st.is_terminal() => {
                    return Ok(EndReason::TransportClosed);
                }
                Some(EngineEvent::StateChanged(_)) => {}
                None => {
                    return Err(CallError::Engine("engine event channel closed".to_string()));
                }
            },

            _ = time::sleep_until(exchange_deadline), if !exchange_done => {
                return Err(CallError::Timeout(match opts.role {
                    CallRole::Initiator => "answer",
                    CallRole::Responder => "offer",
                }));
            }

            _ = time::sleep_until(connect_deadline.unwrap_or_else(Instant::now)),
                if connect_deadline.is_some() && !connected =>
            {
                return Err(CallError::Timeout("transport connect"));
            }
        }
    }
}
