//! Agent loop state management
//!
//! Round counting and token bookkeeping for one conversation-loop invocation.

/// State of one loop invocation
#[derive(Debug, Clone)]
pub struct AgentLoopState {
    /// Rounds started so far
    pub iteration: usize,
    /// Round ceiling
    pub max_iterations: usize,
    /// Total tokens from the latest usage report
    pub tokens_used: u32,
}

impl AgentLoopState {
    /// Create a new loop state with the given ceiling
    pub fn new(max_iterations: usize) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            tokens_used: 0,
        }
    }

    /// Start the next round, returning its 1-based number, or `None` past the ceiling
    pub fn begin_round(&mut self) -> Option<usize> {
        if self.iteration >= self.max_iterations {
            return None;
        }
        self.iteration += 1;
        Some(self.iteration)
    }

    /// Record a usage report
    pub fn record_usage(&mut self, total_tokens: u32) {
        self.tokens_used = total_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_new() {
        let state = AgentLoopState::new(10);
        assert_eq!(state.iteration, 0);
        assert_eq!(state.max_iterations, 10);
        assert_eq!(state.tokens_used, 0);
    }

    #[test]
    fn test_begin_round_stops_at_ceiling() {
        let mut state = AgentLoopState::new(2);
        assert_eq!(state.begin_round(), Some(1));
        assert_eq!(state.begin_round(), Some(2));
        assert_eq!(state.begin_round(), None);
        assert_eq!(state.iteration, 2);
    }

    #[test]
    fn test_zero_ceiling_never_starts() {
        let mut state = AgentLoopState::new(0);
        assert_eq!(state.begin_round(), None);
    }
}
