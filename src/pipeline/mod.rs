//! Per-connection translation pipeline
//!
//! One pipeline per joined participant. It feeds microphone frames into a
//! recognizer session and turns each transcript segment into a caption and,
//! when warranted, an audio clip for the partner. A single worker task
//! consumes a unified stream of transcripts, timer fires and control
//! messages, so every mutation of utterance state is serialized and caption
//! order matches recognizer emission order.
//!
//! Audio for one utterance is emitted at most once: either a final clip, or
//! a single interim clip when speech runs long without a final. The interim
//! suppresses the final clip so the listener never hears both.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::asr::{AsrSession, SpeechRecognizer};
use crate::languages;
use crate::protocol::{ServerEvent, MAX_AUDIO_FRAME_BYTES};
use crate::registry::{ConnectionRegistry, ParticipantSession};
use crate::translate::PivotTranslator;
use crate::tts::SpeechSynthesizer;
use crate::types::{Participant, TranscriptSegment};

/// Minimum spacing between emitted partials.
const PARTIAL_THROTTLE: Duration = Duration::from_millis(100);
/// Minimum spacing between speculative synthesis starts.
const PRE_SYNTH_THROTTLE: Duration = Duration::from_millis(1000);
/// How long a partial may stay in progress before interim audio is emitted.
const STALE_PARTIAL_AFTER: Duration = Duration::from_millis(5000);
/// Translated text must exceed this many characters to be worth voicing.
const MIN_SYNTH_CHARS: usize = 10;

/// Control and timer messages consumed by the pipeline worker.
#[derive(Debug)]
pub enum PipelineEvent {
    /// (Re)start the recognizer session
    MicOn,
    /// Gracefully finish the recognizer session, then clear state
    MicOff,
    /// Hard-stop the recognizer session; the connection stays registered
    Stop,
    /// Connection closed: stop everything and deregister
    Shutdown,
    /// Stale-partial timer fired for the given generation
    StaleTimer(u64),
}

/// Speculative synthesis in flight for the current partial.
struct PreSynth {
    text: String,
    audio: JoinHandle<Option<Vec<u8>>>,
}

/// Mutable per-utterance state, owned by the worker task.
#[derive(Default)]
struct UtteranceState {
    last_partial_emit: Option<Instant>,
    partial_cache: Option<(String, String)>,
    pre_synth: Option<PreSynth>,
    last_pre_synth: Option<Instant>,
    latest_partial: Option<String>,
    stale_generation: u64,
    interim_audio_sent: bool,
}

impl UtteranceState {
    /// Reset everything scoped to the current utterance. The pre-synthesis
    /// throttle is wall-clock and survives utterance boundaries.
    fn clear_utterance(&mut self) {
        self.last_partial_emit = None;
        self.partial_cache = None;
        // An abandoned speculative synth is detached, never awaited.
        self.pre_synth = None;
        self.latest_partial = None;
        self.interim_audio_sent = false;
        self.stale_generation += 1;
    }

    fn clear(&mut self) {
        self.clear_utterance();
        self.last_pre_synth = None;
    }
}

/// Per-connection orchestrator. Shared with the socket handler for frame
/// ingest; all other state lives in the worker task.
pub struct Pipeline {
    participant: Participant,
    registry: Arc<ConnectionRegistry>,
    translator: Arc<PivotTranslator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    asr: RwLock<Option<AsrSession>>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    transcripts_tx: mpsc::UnboundedSender<TranscriptSegment>,
}

impl Pipeline {
    /// Register-side entry point: build the pipeline, start its recognizer
    /// session and spawn the worker.
    pub fn start(
        participant: Participant,
        registry: Arc<ConnectionRegistry>,
        translator: Arc<PivotTranslator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transcripts_tx, transcripts_rx) = mpsc::unbounded_channel();

        let pipeline = Arc::new(Self {
            participant,
            registry,
            translator,
            synthesizer,
            recognizer,
            asr: RwLock::new(None),
            events_tx,
            transcripts_tx,
        });

        pipeline.start_asr();
        tokio::spawn(run_worker(pipeline.clone(), events_rx, transcripts_rx));
        pipeline
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// Enqueue a control or timer event for the worker.
    pub fn post(&self, event: PipelineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Ingest one microphone frame. Non-blocking: the frame lands in the
    /// session FIFO or is dropped. A dead recognizer session is replaced
    /// transparently so no audio is lost while the connection is live.
    pub fn on_audio_frame(&self, frame: &[u8]) {
        if frame.len() > MAX_AUDIO_FRAME_BYTES {
            counter!("audio_frames_oversized_total").increment(1);
            debug!(
                connection_id = %self.participant.connection_id,
                len = frame.len(),
                "dropping oversized audio frame"
            );
            return;
        }

        {
            let guard = self.asr.read().unwrap();
            if let Some(session) = guard.as_ref() {
                if session.alive() {
                    session.push(frame.to_vec());
                    return;
                }
            }
        }

        let mut guard = self.asr.write().unwrap();
        match guard.as_ref() {
            Some(session) if session.alive() => session.push(frame.to_vec()),
            _ => {
                debug!(
                    connection_id = %self.participant.connection_id,
                    "recognizer session dead, restarting"
                );
                let session = self.spawn_asr();
                session.push(frame.to_vec());
                *guard = Some(session);
            }
        }
    }

    fn spawn_asr(&self) -> AsrSession {
        let asr_code = languages::asr(&self.participant.spoken_locale).to_string();
        AsrSession::spawn(
            self.recognizer.clone(),
            asr_code,
            self.transcripts_tx.clone(),
        )
    }

    /// Start (or replace) the recognizer session.
    fn start_asr(&self) {
        *self.asr.write().unwrap() = Some(self.spawn_asr());
    }

    fn stop_asr(&self) {
        if let Some(session) = self.asr.write().unwrap().take() {
            session.stop();
        }
    }

    async fn finish_asr(&self) {
        let session = self.asr.write().unwrap().take();
        if let Some(session) = session {
            session.finish().await;
        }
    }

    fn partner(&self) -> Option<Arc<ParticipantSession>> {
        self.registry
            .partner(&self.participant.meeting_id, &self.participant.connection_id)
    }

    async fn handle_transcript(&self, state: &mut UtteranceState, segment: TranscriptSegment) {
        let speaker = &self.participant;
        let src_mt = languages::mt_from_asr(&segment.source_lang);
        let partner = self.partner();
        let dst_mt = match &partner {
            Some(partner) => languages::mt(&partner.participant().spoken_locale),
            None => languages::mt(&speaker.target_locale),
        };

        if !segment.is_final {
            if let Some(last) = state.last_partial_emit {
                if last.elapsed() < PARTIAL_THROTTLE {
                    return;
                }
            }
        }

        let translated = if src_mt == dst_mt {
            segment.text.clone()
        } else if segment.is_final
            && state
                .partial_cache
                .as_ref()
                .is_some_and(|(original, _)| *original == segment.text)
        {
            state.partial_cache.as_ref().unwrap().1.clone()
        } else {
            match self.translator.translate(&segment.text, src_mt, dst_mt).await {
                Ok(text) => text,
                Err(error) => {
                    warn!(
                        connection_id = %speaker.connection_id,
                        meeting_id = %speaker.meeting_id,
                        attendee = %speaker.display_name,
                        %error,
                        "translation failed, falling back to original text"
                    );
                    segment.text.clone()
                }
            }
        };

        if segment.is_final {
            state.partial_cache = None;
        } else {
            state.partial_cache = Some((segment.text.clone(), translated.clone()));
            state.last_partial_emit = Some(Instant::now());
        }

        if let Some(partner_session) = &partner {
            partner_session.send(ServerEvent::Caption {
                speaker_attendee_id: speaker.attendee_id.clone(),
                speaker_name: speaker.display_name.clone(),
                original_text: segment.text.clone(),
                translated_text: translated.clone(),
                is_final: segment.is_final,
                detected_language: src_mt.to_string(),
                target_language: dst_mt.to_string(),
                start_time_ms: Some(segment.start_ms),
                end_time_ms: Some(segment.end_ms),
            });
            counter!("captions_emitted_total").increment(1);
        }

        if !segment.is_final {
            if let Some(partner_session) = &partner {
                let long_enough = translated.chars().count() > MIN_SYNTH_CHARS;
                let partner_locale = partner_session.participant().spoken_locale.clone();

                if long_enough
                    && state
                        .last_pre_synth
                        .map_or(true, |last| last.elapsed() >= PRE_SYNTH_THROTTLE)
                {
                    state.last_pre_synth = Some(Instant::now());
                    let synthesizer = self.synthesizer.clone();
                    let text = translated.clone();
                    let locale = partner_locale.clone();
                    let audio = tokio::spawn(async move {
                        synthesizer.synthesize(&text, &locale).await.ok().flatten()
                    });
                    // Replacing the slot drops the prior handle; its task
                    // keeps running detached and the result is discarded.
                    state.pre_synth = Some(PreSynth {
                        text: translated.clone(),
                        audio,
                    });
                }

                if long_enough && !state.interim_audio_sent {
                    state.latest_partial = Some(translated.clone());
                    state.stale_generation += 1;
                    let generation = state.stale_generation;
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(STALE_PARTIAL_AFTER).await;
                        let _ = events.send(PipelineEvent::StaleTimer(generation));
                    });
                }
            }
            return;
        }

        // Final path. Bumping the generation cancels any pending stale timer.
        state.stale_generation += 1;
        state.latest_partial = None;

        if let Some(partner_session) = &partner {
            if state.interim_audio_sent {
                // The interim clip already covered this utterance.
                state.pre_synth = None;
            } else {
                let partner_locale = partner_session.participant().spoken_locale.clone();
                let audio = match state.pre_synth.take() {
                    Some(cached) if cached.text == translated => {
                        cached.audio.await.ok().flatten()
                    }
                    stale => {
                        drop(stale);
                        match self.synthesizer.synthesize(&translated, &partner_locale).await {
                            Ok(audio) => audio,
                            Err(error) => {
                                warn!(
                                    connection_id = %speaker.connection_id,
                                    meeting_id = %speaker.meeting_id,
                                    attendee = %speaker.display_name,
                                    %error,
                                    "synthesis failed, caption already delivered"
                                );
                                None
                            }
                        }
                    }
                };

                if let Some(bytes) = audio {
                    partner_session.send(ServerEvent::Audio {
                        speaker_attendee_id: speaker.attendee_id.clone(),
                        audio_data: BASE64.encode(&bytes),
                        target_language: dst_mt.to_string(),
                    });
                    counter!("audio_clips_emitted_total").increment(1);
                }
            }
        }

        state.clear_utterance();
    }

    async fn handle_stale_timer(&self, state: &mut UtteranceState, generation: u64) {
        // A fire from a superseded generation is a no-op: either a newer
        // partial rescheduled the timer or a final already landed.
        if generation != state.stale_generation || state.interim_audio_sent {
            return;
        }
        let Some(text) = state.latest_partial.clone() else {
            return;
        };
        let Some(partner_session) = self.partner() else {
            return;
        };

        state.interim_audio_sent = true;
        let partner_locale = partner_session.participant().spoken_locale.clone();
        match self.synthesizer.synthesize(&text, &partner_locale).await {
            Ok(Some(bytes)) => {
                partner_session.send(ServerEvent::Audio {
                    speaker_attendee_id: self.participant.attendee_id.clone(),
                    audio_data: BASE64.encode(&bytes),
                    target_language: languages::mt(&partner_locale).to_string(),
                });
                counter!("audio_clips_emitted_total").increment(1);
                debug!(
                    connection_id = %self.participant.connection_id,
                    "interim audio emitted for stale partial"
                );
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    connection_id = %self.participant.connection_id,
                    %error,
                    "interim synthesis failed"
                );
            }
        }
    }
}

async fn run_worker(
    pipeline: Arc<Pipeline>,
    mut events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    mut transcripts_rx: mpsc::UnboundedReceiver<TranscriptSegment>,
) {
    let mut state = UtteranceState::default();

    loop {
        tokio::select! {
            Some(segment) = transcripts_rx.recv() => {
                pipeline.handle_transcript(&mut state, segment).await;
            }
            event = events_rx.recv() => match event {
                Some(PipelineEvent::StaleTimer(generation)) => {
                    pipeline.handle_stale_timer(&mut state, generation).await;
                }
                Some(PipelineEvent::MicOn) => {
                    pipeline.start_asr();
                }
                Some(PipelineEvent::MicOff) => {
                    pipeline.finish_asr().await;
                    // Terminal transcripts queued during the flush are still
                    // processed before the state reset.
                    while let Ok(segment) = transcripts_rx.try_recv() {
                        pipeline.handle_transcript(&mut state, segment).await;
                    }
                    state.clear();
                }
                Some(PipelineEvent::Stop) => {
                    pipeline.stop_asr();
                    state.clear();
                }
                Some(PipelineEvent::Shutdown) | None => break,
            }
        }
    }

    pipeline.stop_asr();
    state.clear();
    pipeline
        .registry
        .remove(&pipeline.participant.connection_id);
    info!(
        connection_id = %pipeline.participant.connection_id,
        meeting_id = %pipeline.participant.meeting_id,
        "pipeline shut down"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clear_utterance_keeps_pre_synth_throttle() {
        let mut state = UtteranceState {
            last_pre_synth: Some(Instant::now()),
            interim_audio_sent: true,
            latest_partial: Some("hola a todos".into()),
            ..Default::default()
        };
        let generation = state.stale_generation;
        state.clear_utterance();
        assert!(state.last_pre_synth.is_some());
        assert!(!state.interim_audio_sent);
        assert!(state.latest_partial.is_none());
        assert!(state.stale_generation > generation);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let mut state = UtteranceState {
            last_pre_synth: Some(Instant::now()),
            partial_cache: Some(("a".into(), "b".into())),
            ..Default::default()
        };
        state.clear();
        assert!(state.last_pre_synth.is_none());
        assert!(state.partial_cache.is_none());
    }
}
