//! Matcher queue (expect engine)
//!
//! An ordered queue of pending pattern expectations consumed against
//! incoming sanitized lines. Expectations resolve exactly once, in
//! submission order; only the head of the queue is ever tested. Lines that
//! arrive before any expectation exists land in a backlog that is drained,
//! oldest first, when the next expectation registers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result};

/// A line that satisfied an expectation, with its capture groups.
#[derive(Debug, Clone)]
pub struct LineMatch {
    /// The full sanitized line.
    pub line: String,
    captures: Vec<Option<String>>,
}

impl LineMatch {
    pub(crate) fn new(line: &str, caps: &regex::Captures<'_>) -> Self {
        let captures = caps
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();
        Self {
            line: line.to_string(),
            captures,
        }
    }

    /// Capture group `n` (1-based, as in the pattern).
    pub fn capture(&self, n: usize) -> Option<&str> {
        self.captures.get(n - 1).and_then(|c| c.as_deref())
    }

    /// Capture group `n`, or a protocol mismatch carrying the raw line.
    ///
    /// This is how scripts surface a structurally unrelated response (an
    /// error line where a value was expected) without retrying.
    pub fn require(&self, n: usize) -> Result<&str> {
        self.capture(n).ok_or_else(|| Error::ProtocolMismatch {
            raw: self.line.clone(),
        })
    }
}

/// A registered expectation, either kind resolved only at the queue head.
enum Pending {
    /// Resolves with the first matching line; non-matching lines are
    /// discarded unseen.
    Single {
        pattern: Regex,
        tx: oneshot::Sender<LineMatch>,
    },
    /// Swallows the first line after registration (the command echo), then
    /// accumulates matching lines until the prompt marker arrives.
    Multi {
        pattern: Regex,
        echo_seen: bool,
        acc: Vec<LineMatch>,
        tx: oneshot::Sender<Vec<LineMatch>>,
    },
}

struct State {
    pending: VecDeque<Pending>,
    backlog: VecDeque<String>,
    prompt: Regex,
    closed: bool,
}

/// Shared handle to the matcher queue.
///
/// Cloned into the transport consumer loop; all mutation happens under one
/// mutex, and resolution is delivered through oneshot channels so nothing
/// awaits while the lock is held.
#[derive(Clone)]
pub struct ExpectQueue {
    inner: Arc<Mutex<State>>,
}

impl ExpectQueue {
    pub fn new(prompt: Regex) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                pending: VecDeque::new(),
                backlog: VecDeque::new(),
                prompt,
                closed: false,
            })),
        }
    }

    /// Feed one sanitized line to the queue head (or the backlog).
    pub fn offer(&self, line: &str) {
        let mut state = self.inner.lock().unwrap();
        if state.closed {
            return;
        }
        Self::dispatch(&mut state, line);
    }

    /// Register one expectation per pattern, in order, and resolve when all
    /// have matched. Matches are returned in request order.
    pub async fn await_sequence(&self, patterns: &[Regex]) -> Result<Vec<LineMatch>> {
        let receivers: Vec<_> = {
            let mut state = self.inner.lock().unwrap();
            let receivers = patterns
                .iter()
                .map(|pattern| {
                    let (tx, rx) = oneshot::channel();
                    if !state.closed {
                        state.pending.push_back(Pending::Single {
                            pattern: pattern.clone(),
                            tx,
                        });
                    }
                    rx
                })
                .collect();
            Self::drain_backlog(&mut state);
            receivers
        };

        let mut matches = Vec::with_capacity(receivers.len());
        for rx in receivers {
            matches.push(rx.await.map_err(|_| Error::Closed)?);
        }
        Ok(matches)
    }

    /// Register a single expectation and await its match.
    pub async fn await_single(&self, pattern: &Regex) -> Result<LineMatch> {
        let mut matches = self.await_sequence(std::slice::from_ref(pattern)).await?;
        matches.pop().ok_or(Error::Closed)
    }

    /// Register a multi expectation: every line matching `pattern` between
    /// the command echo and the next prompt marker, echo excluded.
    pub async fn await_until_prompt(&self, pattern: &Regex) -> Result<Vec<LineMatch>> {
        let rx = {
            let mut state = self.inner.lock().unwrap();
            let (tx, rx) = oneshot::channel();
            if !state.closed {
                state.pending.push_back(Pending::Multi {
                    pattern: pattern.clone(),
                    echo_seen: false,
                    acc: Vec::new(),
                    tx,
                });
                Self::drain_backlog(&mut state);
            }
            rx
        };
        rx.await.map_err(|_| Error::Closed)
    }

    /// Abandon all pending expectations and refuse further registrations.
    /// Dropped senders surface as [`Error::Closed`] to their awaiters.
    pub fn close(&self) {
        let mut state = self.inner.lock().unwrap();
        state.closed = true;
        state.pending.clear();
        state.backlog.clear();
    }

    /// True when no expectation is registered and the backlog is empty.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock().unwrap();
        state.pending.is_empty() && state.backlog.is_empty()
    }

    fn dispatch(state: &mut State, line: &str) {
        let is_prompt = state.prompt.is_match(line);
        let pop = match state.pending.front_mut() {
            None => {
                state.backlog.push_back(line.to_string());
                return;
            }
            Some(Pending::Single { pattern, .. }) => pattern.is_match(line),
            Some(Pending::Multi {
                pattern,
                echo_seen,
                acc,
                ..
            }) => {
                if !*echo_seen {
                    // The first line after registration is the command echo.
                    *echo_seen = true;
                    trace!(line = %line, "echo swallowed");
                    false
                } else if is_prompt {
                    true
                } else {
                    if let Some(caps) = pattern.captures(line) {
                        acc.push(LineMatch::new(line, &caps));
                    }
                    false
                }
            }
        };
        if !pop {
            return;
        }
        match state.pending.pop_front() {
            Some(Pending::Single { pattern, tx }) => {
                if let Some(caps) = pattern.captures(line) {
                    let _ = tx.send(LineMatch::new(line, &caps));
                }
            }
            Some(Pending::Multi { acc, tx, .. }) => {
                let _ = tx.send(acc);
            }
            None => {}
        }
    }

    /// Invariant: the backlog is only non-empty while no expectation is
    /// registered, so draining re-runs the dispatch algorithm per line;
    /// surplus lines fall back into the backlog in their original order.
    fn drain_backlog(state: &mut State) {
        let lines: Vec<String> = state.backlog.drain(..).collect();
        for line in lines {
            Self::dispatch(state, &line);
        }
    }
}
