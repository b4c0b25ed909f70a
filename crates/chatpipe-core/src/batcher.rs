// Word batcher: coalesces high-frequency text/reasoning deltas
//
// Token streams from a generation engine arrive word-by-word (or smaller).
// Forwarding every delta downstream amplifies SSE frames, persistence
// churn and UI re-renders, so consecutive deltas of the same part are
// buffered until a word threshold is reached or the buffer gets too old.
// Only text-delta/reasoning-delta events are ever held back; every other
// event flushes open buffers first so cross-event ordering is preserved.
//
// The batcher itself is a pure state machine (push/flush_stale) so it can
// be tested without a runtime; `batched` wraps it into a stream adapter
// driven by a flush interval at half the max-latency threshold.

use futures::stream::{self, Stream, StreamExt};
use tokio::time::{Duration, Instant};

use crate::event::StreamEvent;

const DEFAULT_FLUSH_WORDS: usize = 10;
const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(350);

/// Batching thresholds
#[derive(Debug, Clone, Copy)]
pub struct BatcherConfig {
    /// Flush a buffer once it holds at least this many words
    pub flush_words: usize,
    /// Flush a buffer once its last flush is older than this
    pub max_latency: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_words: DEFAULT_FLUSH_WORDS,
            max_latency: DEFAULT_MAX_LATENCY,
        }
    }
}

impl BatcherConfig {
    /// Load thresholds from CHATPIPE_FLUSH_WORDS / CHATPIPE_MAX_LATENCY_MS,
    /// falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let flush_words = std::env::var("CHATPIPE_FLUSH_WORDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.flush_words);
        let max_latency = std::env::var("CHATPIPE_MAX_LATENCY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&ms: &u64| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_latency);
        Self {
            flush_words,
            max_latency,
        }
    }

    /// Period of the timer that drives time-based flushes
    pub fn tick_period(&self) -> Duration {
        self.max_latency / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferKind {
    Text,
    Reasoning,
}

#[derive(Debug)]
struct PartBuffer {
    kind: BufferKind,
    id: String,
    text: String,
    words: usize,
    last_flush: Instant,
}

impl PartBuffer {
    fn delta_event(&mut self) -> StreamEvent {
        let delta = std::mem::take(&mut self.text);
        self.words = 0;
        match self.kind {
            BufferKind::Text => StreamEvent::TextDelta {
                id: self.id.clone(),
                delta,
            },
            BufferKind::Reasoning => StreamEvent::ReasoningDelta {
                id: self.id.clone(),
                delta,
            },
        }
    }
}

/// Coalesces consecutive deltas of the same part by word count and age
#[derive(Debug)]
pub struct WordBatcher {
    config: BatcherConfig,
    buffers: Vec<PartBuffer>,
}

impl Default for WordBatcher {
    fn default() -> Self {
        Self::new(BatcherConfig::default())
    }
}

impl WordBatcher {
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            config,
            buffers: Vec::new(),
        }
    }

    /// Feed one event; returns the events to forward downstream, in order
    pub fn push(&mut self, event: StreamEvent, now: Instant) -> Vec<StreamEvent> {
        match event {
            StreamEvent::TextDelta { id, delta } => {
                self.buffer_delta(BufferKind::Text, id, delta, now)
            }
            StreamEvent::ReasoningDelta { id, delta } => {
                self.buffer_delta(BufferKind::Reasoning, id, delta, now)
            }

            StreamEvent::TextStart { ref id } => {
                let mut out = self.flush_all();
                self.open(BufferKind::Text, id.clone(), now);
                out.push(event);
                out
            }
            StreamEvent::ReasoningStart { ref id } => {
                let mut out = self.flush_all();
                self.open(BufferKind::Reasoning, id.clone(), now);
                out.push(event);
                out
            }

            StreamEvent::TextEnd { ref id } | StreamEvent::ReasoningEnd { ref id } => {
                let mut out = self.flush_all();
                let id = id.clone();
                self.buffers.retain(|b| b.id != id);
                out.push(event);
                out
            }

            // Heartbeats carry no state and must not force early flushes
            StreamEvent::Ping => vec![event],

            // Everything else passes through behind any buffered text so
            // the original interleaving is preserved
            other => {
                let mut out = self.flush_all();
                out.push(other);
                out
            }
        }
    }

    /// Flush buffers whose last flush is older than the max-latency
    /// threshold. Call this periodically (see [`BatcherConfig::tick_period`]).
    pub fn flush_stale(&mut self, now: Instant) -> Vec<StreamEvent> {
        let max_latency = self.config.max_latency;
        let mut out = Vec::new();
        for buffer in &mut self.buffers {
            if !buffer.text.is_empty()
                && now.saturating_duration_since(buffer.last_flush) >= max_latency
            {
                out.push(buffer.delta_event());
                buffer.last_flush = now;
            }
        }
        out
    }

    /// Flush every non-empty buffer unconditionally
    pub fn flush_all(&mut self) -> Vec<StreamEvent> {
        self.buffers
            .iter_mut()
            .filter(|b| !b.text.is_empty())
            .map(|b| b.delta_event())
            .collect()
    }

    fn buffer_delta(
        &mut self,
        kind: BufferKind,
        id: String,
        delta: String,
        now: Instant,
    ) -> Vec<StreamEvent> {
        // A delta for a different part closes out any other pending text,
        // keeping cross-part order intact
        let mut out: Vec<StreamEvent> = self
            .buffers
            .iter_mut()
            .filter(|b| !(b.kind == kind && b.id == id) && !b.text.is_empty())
            .map(|b| b.delta_event())
            .collect();

        let flush_words = self.config.flush_words;
        let buffer = self.open(kind, id, now);

        // Words are counted per incoming delta, not over the whole buffer
        buffer.words += delta.split_whitespace().count();
        buffer.text.push_str(&delta);

        if buffer.words >= flush_words {
            out.push(buffer.delta_event());
            buffer.last_flush = now;
        }
        out
    }

    fn open(&mut self, kind: BufferKind, id: String, now: Instant) -> &mut PartBuffer {
        if let Some(idx) = self.buffers.iter().position(|b| b.kind == kind && b.id == id) {
            return &mut self.buffers[idx];
        }
        self.buffers.push(PartBuffer {
            kind,
            id,
            text: String::new(),
            words: 0,
            last_flush: now,
        });
        let idx = self.buffers.len() - 1;
        &mut self.buffers[idx]
    }
}

// ============================================
// Stream adapter
// ============================================

struct AdapterState<S> {
    input: Option<S>,
    batcher: WordBatcher,
    interval: tokio::time::Interval,
}

/// Wrap an event stream with word/time batching.
///
/// The returned stream yields the same events with text/reasoning deltas
/// coalesced; when the input ends, any remaining buffered text is flushed.
pub fn batched<S>(input: S, config: BatcherConfig) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = StreamEvent> + Unpin,
{
    let period = config.tick_period();
    let state = AdapterState {
        input: Some(input),
        batcher: WordBatcher::new(config),
        interval: tokio::time::interval_at(Instant::now() + period, period),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            let Some(input) = state.input.as_mut() else {
                return None;
            };
            tokio::select! {
                maybe = input.next() => match maybe {
                    Some(event) => {
                        let out = state.batcher.push(event, Instant::now());
                        if !out.is_empty() {
                            return Some((stream::iter(out), state));
                        }
                    }
                    None => {
                        // Input ended without a terminal event; don't lose text
                        let out = state.batcher.flush_all();
                        state.input = None;
                        return Some((stream::iter(out), state));
                    }
                },
                _ = state.interval.tick() => {
                    let out = state.batcher.flush_stale(Instant::now());
                    if !out.is_empty() {
                        return Some((stream::iter(out), state));
                    }
                }
            }
        }
    })
    .flatten()
}

// ============================================
// Tests
// ============================================
