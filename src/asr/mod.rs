//! Streaming speech recognition
//!
//! `AsrSession` is a push-based adapter over one streaming recognizer
//! connection. Frame ingest is non-blocking: frames land in a bounded FIFO
//! that drops the oldest entry under overflow, because audio is real-time
//! and stale frames are worthless. A driver task owns the upstream stream
//! and handles keep-alive pings, bounded reconnect attempts and the
//! proactive refresh required by providers with hard session lifetimes.

pub mod deepgram;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::TranscriptSegment;

/// Frames and control messages sent to the recognizer.
#[derive(Debug)]
pub enum RecognizerInput {
    /// Raw PCM16 LE mono audio at 16 kHz
    Audio(Vec<u8>),
    /// Silence ping so the provider keeps the stream open
    KeepAlive,
    /// Flush buffered audio and return terminal transcripts, then close
    Finish,
}

/// Events delivered by the recognizer.
#[derive(Debug)]
pub enum RecognizerEvent {
    Transcript(TranscriptSegment),
    /// The stream ended
    Closed,
    /// The stream failed; the session may reconnect
    Error(String),
}

/// One open recognizer stream: a lane in, a lane out.
pub struct RecognizerStream {
    pub input: mpsc::Sender<RecognizerInput>,
    pub events: mpsc::Receiver<RecognizerEvent>,
}

/// Connection seam to a streaming recognizer provider.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Open a streaming session for one recognizer dialect.
    async fn open(&self, asr_code: &str) -> Result<RecognizerStream>;
}

/// Bounded frame FIFO capacity.
const FRAME_FIFO_CAP: usize = 256;
/// Maximum reconnect attempts after a transient stream error.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Base reconnect delay, scaled linearly per attempt.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Silence ping interval required by the provider.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(8);
/// Streams are refreshed before the provider's 8-minute session cap.
const REFRESH_AFTER: Duration = Duration::from_secs(7 * 60);
/// A session with no audio for this long is closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// How long a graceful finish waits for terminal transcripts.
const FINISH_TIMEOUT: Duration = Duration::from_secs(5);

enum SessionCommand {
    Finish(oneshot::Sender<()>),
    Stop,
}

/// Bounded frame queue shared between ingest and the driver task.
struct FrameFifo {
    frames: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl FrameFifo {
    fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, frame: Vec<u8>) {
        {
            let mut frames = self.frames.lock().unwrap();
            if frames.len() >= FRAME_FIFO_CAP {
                frames.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<Vec<u8>> {
        let mut frames = self.frames.lock().unwrap();
        frames.drain(..).collect()
    }

    fn clear(&self) {
        self.frames.lock().unwrap().clear();
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Push-based adapter over one logical recognizer session.
pub struct AsrSession {
    alive: Arc<AtomicBool>,
    fifo: Arc<FrameFifo>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    driver: tokio::task::JoinHandle<()>,
}

impl AsrSession {
    /// Start a session for one recognizer dialect. Transcripts are delivered
    /// on `transcripts` in recognizer-emission order.
    pub fn spawn(
        recognizer: Arc<dyn SpeechRecognizer>,
        asr_code: String,
        transcripts: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let fifo = Arc::new(FrameFifo::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(drive(
            recognizer,
            asr_code,
            transcripts,
            fifo.clone(),
            alive.clone(),
            commands_rx,
        ));

        Self {
            alive,
            fifo,
            commands: commands_tx,
            driver,
        }
    }

    /// Queue an audio frame. Never blocks.
    pub fn push(&self, frame: Vec<u8>) {
        self.fifo.push(frame);
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Flush buffered audio, wait for terminal transcripts, then close.
    /// Succeeds immediately when the session is already dead.
    pub async fn finish(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(SessionCommand::Finish(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Hard-close the session without flushing.
    pub fn stop(&self) {
        let _ = self.commands.send(SessionCommand::Stop);
    }
}

impl Drop for AsrSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum StreamExit {
    Finished,
    Stopped,
    Idle,
    Refresh,
    Transient,
}

async fn drive(
    recognizer: Arc<dyn SpeechRecognizer>,
    asr_code: String,
    transcripts: mpsc::UnboundedSender<TranscriptSegment>,
    fifo: Arc<FrameFifo>,
    alive: Arc<AtomicBool>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) {
    let mut attempt: u32 = 0;
    let mut ever_connected = false;
    let mut last_audio = Instant::now();
    let mut pending_finish: Option<oneshot::Sender<()>> = None;

    'sessions: loop {
        if attempt > 0 {
            if attempt > MAX_RECONNECT_ATTEMPTS {
                warn!(asr_code, "recognizer reconnect attempts exhausted");
                break;
            }
            let delay = RECONNECT_DELAY * attempt;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                command = commands.recv() => match command {
                    Some(SessionCommand::Finish(ack)) => {
                        let _ = ack.send(());
                        break 'sessions;
                    }
                    Some(SessionCommand::Stop) | None => break 'sessions,
                }
            }
            // A fresh FIFO per attempt: audio from the gap is lost on purpose.
            fifo.clear();
        }

        let mut stream = match recognizer.open(&asr_code).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(asr_code, %error, "recognizer connect failed");
                if !ever_connected {
                    break;
                }
                attempt += 1;
                continue;
            }
        };
        ever_connected = true;
        attempt = 0;

        let opened_at = Instant::now();
        let mut last_sent = Instant::now();
        let mut finish_deadline: Option<Instant> = None;

        let exit = 'stream: loop {
            let keepalive_at = last_sent + KEEPALIVE_INTERVAL;
            let finish_at =
                finish_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = fifo.notify.notified() => {
                    for frame in fifo.drain() {
                        last_audio = Instant::now();
                        last_sent = Instant::now();
                        if stream.input.send(RecognizerInput::Audio(frame)).await.is_err() {
                            break 'stream StreamExit::Transient;
                        }
                    }
                }
                _ = tokio::time::sleep_until(keepalive_at) => {
                    if stream.input.send(RecognizerInput::KeepAlive).await.is_err() {
                        break 'stream StreamExit::Transient;
                    }
                    last_sent = Instant::now();
                }
                _ = tokio::time::sleep_until(opened_at + REFRESH_AFTER) => {
                    debug!(asr_code, "refreshing recognizer stream before session cap");
                    break 'stream StreamExit::Refresh;
                }
                _ = tokio::time::sleep_until(last_audio + IDLE_TIMEOUT) => {
                    debug!(asr_code, "recognizer session idle timeout");
                    break 'stream StreamExit::Idle;
                }
                _ = tokio::time::sleep_until(finish_at) => {
                    break 'stream StreamExit::Finished;
                }
                event = stream.events.recv() => match event {
                    Some(RecognizerEvent::Transcript(segment)) => {
                        let _ = transcripts.send(segment);
                    }
                    Some(RecognizerEvent::Closed) | None => {
                        break 'stream if pending_finish.is_some() {
                            StreamExit::Finished
                        } else {
                            StreamExit::Transient
                        };
                    }
                    Some(RecognizerEvent::Error(message)) => {
                        warn!(asr_code, %message, "recognizer stream error");
                        break 'stream if pending_finish.is_some() {
                            StreamExit::Finished
                        } else {
                            StreamExit::Transient
                        };
                    }
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Finish(ack)) => {
                        for frame in fifo.drain() {
                            let _ = stream.input.send(RecognizerInput::Audio(frame)).await;
                        }
                        let _ = stream.input.send(RecognizerInput::Finish).await;
                        pending_finish = Some(ack);
                        finish_deadline = Some(Instant::now() + FINISH_TIMEOUT);
                    }
                    Some(SessionCommand::Stop) | None => break 'stream StreamExit::Stopped,
                },
            }
        };

        match exit {
            StreamExit::Refresh => continue 'sessions,
            StreamExit::Transient => {
                attempt += 1;
                continue 'sessions;
            }
            StreamExit::Finished | StreamExit::Stopped | StreamExit::Idle => break 'sessions,
        }
    }

    alive.store(false, Ordering::SeqCst);
    if let Some(ack) = pending_finish.take() {
        let _ = ack.send(());
    }
    if fifo.dropped() > 0 {
        debug!(
            dropped = fifo.dropped(),
            "frames dropped by session FIFO overflow"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, PartialEq)]
    enum Received {
        Audio(Vec<u8>),
        KeepAlive,
        Finish,
    }

    struct StreamProbe {
        event_tx: mpsc::Sender<RecognizerEvent>,
        received: Arc<StdMutex<Vec<Received>>>,
    }

    /// Recognizer whose streams are fully driven by the test.
    struct ScriptedRecognizer {
        reject_all: AtomicBool,
        streams: StdMutex<Vec<StreamProbe>>,
    }

    impl ScriptedRecognizer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                reject_all: AtomicBool::new(false),
                streams: StdMutex::new(Vec::new()),
            })
        }

        fn open_count(&self) -> usize {
            self.streams.lock().unwrap().len()
        }

        fn received(&self, index: usize) -> Vec<Received> {
            let streams = self.streams.lock().unwrap();
            let mut received = streams[index].received.lock().unwrap();
            received.drain(..).collect()
        }

        async fn emit(&self, index: usize, event: RecognizerEvent) {
            let tx = self.streams.lock().unwrap()[index].event_tx.clone();
            let _ = tx.send(event).await;
        }

        fn kill(&self, index: usize) {
            // Replacing the sender closes the events channel from the provider side.
            let (tx, _rx) = mpsc::channel(1);
            self.streams.lock().unwrap()[index].event_tx = tx;
        }
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn open(&self, _asr_code: &str) -> Result<RecognizerStream> {
            if self.reject_all.load(Ordering::SeqCst) {
                return Err(crate::error::Error::Asr("connect refused".into()));
            }
            let (input_tx, mut input_rx) = mpsc::channel(64);
            let (event_tx, event_rx) = mpsc::channel(64);
            let received = Arc::new(StdMutex::new(Vec::new()));
            let sink = received.clone();
            tokio::spawn(async move {
                while let Some(input) = input_rx.recv().await {
                    let entry = match input {
                        RecognizerInput::Audio(bytes) => Received::Audio(bytes),
                        RecognizerInput::KeepAlive => Received::KeepAlive,
                        RecognizerInput::Finish => Received::Finish,
                    };
                    sink.lock().unwrap().push(entry);
                }
            });
            self.streams
                .lock()
                .unwrap()
                .push(StreamProbe { event_tx, received });
            Ok(RecognizerStream {
                input: input_tx,
                events: event_rx,
            })
        }
    }

    fn segment(text: &str, is_final: bool) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            is_final,
            source_lang: "en".to_string(),
            start_ms: 0,
            end_ms: 100,
        }
    }

    async fn settle() {
        // Let spawned tasks run; with paused time this does not sleep for real.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn fifo_drops_oldest_on_overflow() {
        let fifo = FrameFifo::new();
        for i in 0..(FRAME_FIFO_CAP + 3) {
            fifo.push(vec![i as u8]);
        }
        let frames = fifo.drain();
        assert_eq!(frames.len(), FRAME_FIFO_CAP);
        assert_eq!(frames[0], vec![3u8]);
        assert_eq!(fifo.dropped(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_flow_to_recognizer() {
        let recognizer = ScriptedRecognizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;

        session.push(vec![1, 2, 3]);
        session.push(vec![4, 5]);
        settle().await;

        assert_eq!(recognizer.open_count(), 1);
        assert_eq!(
            recognizer.received(0),
            vec![Received::Audio(vec![1, 2, 3]), Received::Audio(vec![4, 5])]
        );
        assert!(session.alive());
    }

    #[tokio::test(start_paused = true)]
    async fn transcripts_are_forwarded_in_order() {
        let recognizer = ScriptedRecognizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;

        recognizer
            .emit(0, RecognizerEvent::Transcript(segment("hel", false)))
            .await;
        recognizer
            .emit(0, RecognizerEvent::Transcript(segment("hello", true)))
            .await;
        settle().await;

        assert_eq!(rx.try_recv().unwrap().text, "hel");
        let last = rx.try_recv().unwrap();
        assert_eq!(last.text, "hello");
        assert!(last.is_final);
        drop(session);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_failure_is_fatal() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.reject_all.store(true, Ordering::SeqCst);
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;

        assert!(!session.alive());
        assert_eq!(recognizer.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_attempts_are_capped() {
        let recognizer = ScriptedRecognizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;
        assert!(session.alive());

        // Stream dies, and every reconnect is refused.
        recognizer.reject_all.store(true, Ordering::SeqCst);
        recognizer.kill(0);

        // Attempts back off linearly; jump far past the last one.
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert!(!session.alive());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_recovers_after_transient_error() {
        let recognizer = ScriptedRecognizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;

        recognizer.kill(0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        assert!(session.alive());
        assert_eq!(recognizer.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_flushes_and_acks() {
        let recognizer = ScriptedRecognizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;

        session.push(vec![9]);
        let finish = session.finish();
        tokio::pin!(finish);
        // Poll the finish future so the command lands, then feed the
        // recognizer its terminal transcript.
        tokio::select! {
            _ = &mut finish => panic!("finish before recognizer closed"),
            _ = settle() => {}
        }
        recognizer
            .emit(0, RecognizerEvent::Transcript(segment("done", true)))
            .await;
        recognizer.emit(0, RecognizerEvent::Closed).await;

        finish.await;
        assert!(!session.alive());
        let received = recognizer.received(0);
        assert!(received.contains(&Received::Audio(vec![9])));
        assert!(received.contains(&Received::Finish));
        assert_eq!(rx.try_recv().unwrap().text, "done");
    }

    #[tokio::test(start_paused = true)]
    async fn finish_succeeds_on_dead_session() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.reject_all.store(true, Ordering::SeqCst);
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;
        assert!(!session.alive());

        // Must not hang.
        session.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_ping_during_silence() {
        let recognizer = ScriptedRecognizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = AsrSession::spawn(recognizer.clone(), "en-US".into(), tx);
        settle().await;

        tokio::time::sleep(KEEPALIVE_INTERVAL + Duration::from_millis(100)).await;
        settle().await;

        assert!(recognizer.received(0).contains(&Received::KeepAlive));
        drop(session);
    }
}
