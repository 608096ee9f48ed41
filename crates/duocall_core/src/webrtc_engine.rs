/*
 * SPDX-FileCopyrightText: 2026 Duocall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Production [`ConnectionEngine`] over the `webrtc` crate.
//!
//! Capture hardware is platform territory, so local tracks come from an injected
//! [`MediaSource`]; everything else (peer connection construction, description and
//! candidate plumbing, state reporting) lives here. Candidates that arrive before the
//! remote description is set are buffered and flushed once it lands, and a duplicate
//! remote description is ignored rather than handed to the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use duocall_protocol::{CandidateInit, SessionDescription};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;

use crate::config::CallConfig;
use crate::engine::{
    ConnectionEngine, EngineConnection, EngineEvent, LinkState, LocalMedia, RemoteTrackInfo,
};
use crate::error::CallError;

/// Produces the local capture tracks. Failure means devices are unavailable or
/// permission was refused.
#[async_trait]
pub trait MediaSource: Send + Sync + 'static {
    async fn open(&self) -> Result<WebrtcMedia, CallError>;
}

/// Local capture tracks plus a release hook invoked exactly once on stop.
pub struct WebrtcMedia {
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    // Mutex makes the type `Sync` despite the non-`Sync` boxed `FnOnce`.
    release: std::sync::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl WebrtcMedia {
    pub fn new(tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>) -> Self {
        Self { tracks, release: std::sync::Mutex::new(None) }
    }

    pub fn with_release(
        tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { tracks, release: std::sync::Mutex::new(Some(Box::new(release))) }
    }
}

#[async_trait]
impl LocalMedia for WebrtcMedia {
    async fn stop(&mut self) {
        let release = self.release.get_mut().map(|r| r.take()).unwrap_or(None);
        if let Some(release) = release {
            release();
        }
    }
}

pub struct WebrtcEngine {
    config: CallConfig,
    media: Arc<dyn MediaSource>,
}

impl WebrtcEngine {
    pub fn new(config: CallConfig, media: Arc<dyn MediaSource>) -> Self {
        Self { config, media }
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        let urls = self.config.ice_urls();
        if urls.is_empty() {
            return Vec::new();
        }
        vec![RTCIceServer {
            urls,
            username: self.config.ice_username().unwrap_or_default(),
            credential: self.config.ice_credential().unwrap_or_default(),
            ..Default::default()
        }]
    }
}

fn engine_err(e: webrtc::Error) -> CallError {
    CallError::Engine(e.to_string())
}

fn link_state(st: RTCPeerConnectionState) -> LinkState {
    match st {
        RTCPeerConnectionState::New => LinkState::New,
        RTCPeerConnectionState::Connecting => LinkState::Connecting,
        RTCPeerConnectionState::Connected => LinkState::Connected,
        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
        RTCPeerConnectionState::Failed => LinkState::Failed,
        RTCPeerConnectionState::Closed => LinkState::Closed,
        RTCPeerConnectionState::Unspecified => LinkState::New,
    }
}

fn to_candidate_init(init: RTCIceCandidateInit) -> CandidateInit {
    CandidateInit {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
    }
}

fn from_candidate_init(cand: CandidateInit) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: cand.candidate,
        sdp_mid: cand.sdp_mid,
        sdp_mline_index: cand.sdp_mline_index,
        username_fragment: None,
    }
}

fn to_remote_description(desc: SessionDescription) -> Result<RTCSessionDescription, CallError> {
    match desc.kind.as_str() {
        "offer" => RTCSessionDescription::offer(desc.sdp).map_err(engine_err),
        "answer" => RTCSessionDescription::answer(desc.sdp).map_err(engine_err),
        other => Err(CallError::Engine(format!("unsupported description kind: {other}"))),
    }
}

pub struct WebrtcConnection {
    pc: Arc<RTCPeerConnection>,
    remote_set: AtomicBool,
    /// Candidates that beat the remote description, applied once it is set.
    pending: Mutex<Vec<CandidateInit>>,
}

#[async_trait]
impl ConnectionEngine for WebrtcEngine {
    type Media = WebrtcMedia;
    type Connection = WebrtcConnection;

    async fn acquire_local_media(&self) -> Result<WebrtcMedia, CallError> {
        self.media.open().await
    }

    async fn create_connection(
        &self,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<WebrtcConnection, CallError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(engine_err)?;
        let registry =
            register_default_interceptors(Registry::new(), &mut media_engine).map_err(engine_err)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers: self.ice_servers(),
                ..Default::default()
            })
            .await
            .map_err(engine_err)?,
        );

        {
            let tx = events.clone();
            pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
                let tx = tx.clone();
                Box::pin(async move {
                    // None marks the end of gathering.
                    let Some(cand) = cand else { return };
                    if let Ok(init) = cand.to_json() {
                        let _ = tx.send(EngineEvent::LocalCandidate(to_candidate_init(init))).await;
                    }
                })
            }));
        }

        {
            let tx = events.clone();
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                let tx = tx.clone();
                let info = RemoteTrackInfo {
                    id: track.id(),
                    kind: match track.kind() {
                        RTPCodecType::Audio => "audio".to_string(),
                        RTPCodecType::Video => "video".to_string(),
                        RTPCodecType::Unspecified => "unspecified".to_string(),
                    },
                };
                Box::pin(async move {
                    let _ = tx.send(EngineEvent::RemoteTrack(info)).await;
                })
            }));
        }

        {
            let tx = events;
            pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(EngineEvent::StateChanged(link_state(st))).await;
                })
            }));
        }

        Ok(WebrtcConnection { pc, remote_set: AtomicBool::new(false), pending: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl EngineConnection for WebrtcConnection {
    type Media = WebrtcMedia;

    async fn attach_local_media(&self, media: &WebrtcMedia) -> Result<(), CallError> {
        for track in &media.tracks {
            self.pc.add_track(track.clone()).await.map_err(engine_err)?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        let offer = self.pc.create_offer(None).await.map_err(engine_err)?;
        self.pc.set_local_description(offer.clone()).await.map_err(engine_err)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        let answer = self.pc.create_answer(None).await.map_err(engine_err)?;
        self.pc.set_local_description(answer.clone()).await.map_err(engine_err)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), CallError> {
        if self.remote_set.swap(true, Ordering::SeqCst) {
            debug!("duplicate remote description ignored");
            return Ok(());
        }
        let remote = to_remote_description(desc)?;
        self.pc.set_remote_description(remote).await.map_err(engine_err)?;

        let buffered = {
            let mut pending = self.pending.lock().await;
            std::mem::take(&mut *pending)
        };
        for cand in buffered {
            self.pc
                .add_ice_candidate(from_candidate_init(cand))
                .await
                .map_err(engine_err)?;
        }
        Ok(())
    }

    async fn add_remote_candidate(&self, cand: CandidateInit) -> Result<(), CallError> {
        if !self.remote_set.load(Ordering::SeqCst) {
            self.pending.lock().await.push(cand);
            return Ok(());
        }
        self.pc
            .add_ice_candidate(from_candidate_init(cand))
            .await
            .map_err(engine_err)
    }

    async fn close(&self) {
        let _ = self.pc.close().await;
    }
}
