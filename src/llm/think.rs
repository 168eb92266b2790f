//! Inline think-block scanner
//!
//! Some backends stream reasoning inside the plain content channel, wrapped in
//! `<think>` / `</think>` markers, instead of using a dedicated reasoning field.
//! The scanner splits such content into reasoning and visible spans. Markers may
//! arrive split across any number of chunks; a trailing partial marker is held
//! back until the next chunk decides it.

/// Opening marker of a think block
pub const OPEN_MARKER: &str = "<think>";
/// Closing marker of a think block
pub const CLOSE_MARKER: &str = "</think>";

/// Which channel the scanner is currently routing to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkState {
    /// Inside a think block
    Reasoning,
    /// Outside any think block
    Visible,
}

/// A span of content routed to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Reasoning(String),
    Visible(String),
}

/// Two-state scanner over content text
#[derive(Debug, Clone)]
pub struct ThinkScanner {
    state: ThinkState,
    carry: String,
}

impl ThinkScanner {
    /// Start inside reasoning: a backend may omit the opening marker for an
    /// already-active reasoning turn.
    pub fn new() -> Self {
        Self::with_state(ThinkState::Reasoning)
    }

    /// Start in an explicit state
    pub fn with_state(state: ThinkState) -> Self {
        Self {
            state,
            carry: String::new(),
        }
    }

    /// Current routing state
    pub fn state(&self) -> ThinkState {
        self.state
    }

    /// Feed one chunk of content, returning the spans that are now decided
    pub fn push(&mut self, chunk: &str) -> Vec<Routed> {
        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(chunk);

        let mut out = Vec::new();
        let mut rest = buffer.as_str();

        loop {
            match self.next_marker(rest) {
                Some((pos, marker)) => {
                    emit(&mut out, self.state, &rest[..pos]);
                    rest = &rest[pos + marker.len()..];
                    if marker == CLOSE_MARKER {
                        self.state = ThinkState::Visible;
                    } else {
                        self.state = ThinkState::Reasoning;
                    }
                }
                None => {
                    let hold = self.partial_marker_len(rest);
                    let split = rest.len() - hold;
                    emit(&mut out, self.state, &rest[..split]);
                    self.carry = rest[split..].to_string();
                    break;
                }
            }
        }

        out
    }

    /// Flush any held-back text once the stream ends
    pub fn finish(&mut self) -> Option<Routed> {
        let carry = std::mem::take(&mut self.carry);
        let mut out = Vec::new();
        emit(&mut out, self.state, &carry);
        out.pop()
    }

    /// Earliest marker relevant to the current state.
    ///
    /// Inside reasoning a redundant opening marker is consumed without changing state.
    fn next_marker(&self, text: &str) -> Option<(usize, &'static str)> {
        match self.state {
            ThinkState::Visible => text.find(OPEN_MARKER).map(|pos| (pos, OPEN_MARKER)),
            ThinkState::Reasoning => {
                let close = text.find(CLOSE_MARKER).map(|pos| (pos, CLOSE_MARKER));
                let open = text.find(OPEN_MARKER).map(|pos| (pos, OPEN_MARKER));
                match (close, open) {
                    (Some(c), Some(o)) => Some(if o.0 < c.0 { o } else { c }),
                    (c, o) => c.or(o),
                }
            }
        }
    }

    /// Length of the longest suffix of `text` that could still grow into a marker
    fn partial_marker_len(&self, text: &str) -> usize {
        let markers: &[&str] = match self.state {
            ThinkState::Visible => &[OPEN_MARKER],
            ThinkState::Reasoning => &[OPEN_MARKER, CLOSE_MARKER],
        };

        markers
            .iter()
            .map(|marker| {
                (1..marker.len())
                    .rev()
                    .find(|&k| text.ends_with(&marker[..k]))
                    .unwrap_or(0)
            })
            .max()
            .unwrap_or(0)
    }
}

impl Default for ThinkScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn emit(out: &mut Vec<Routed>, state: ThinkState, text: &str) {
    if text.is_empty() {
        return;
    }
    match (out.last_mut(), state) {
        (Some(Routed::Reasoning(prev)), ThinkState::Reasoning) => prev.push_str(text),
        (Some(Routed::Visible(prev)), ThinkState::Visible) => prev.push_str(text),
        (_, ThinkState::Reasoning) => out.push(Routed::Reasoning(text.to_string())),
        (_, ThinkState::Visible) => out.push(Routed::Visible(text.to_string())),
    }
}
