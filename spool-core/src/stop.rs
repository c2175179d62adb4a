//! Stopping criteria polled by a generation loop.

use derive_new::new;

/// Predicate evaluated after every incremental generation step.
///
/// `sequences` holds every candidate of the batch, each one the full token
/// ids accumulated so far, prompt included. The loop aborts generation as
/// soon as any polled criterion returns true.
pub trait StoppingCriteria: Send {
    fn should_stop(&mut self, sequences: &[Vec<u32>]) -> bool;
}

/// Halts generation once a sentinel token subsequence appears in any
/// candidate, ignoring the first `start_offset` tokens (the prompt).
///
/// Tokens are compared by id equality. An empty sentinel, or a suffix still
/// shorter than the sentinel, never matches.
#[derive(Clone, Debug, new)]
pub struct SentinelMatcher {
    sentinel: Vec<u32>,
    start_offset: usize,
}

impl StoppingCriteria for SentinelMatcher {
    fn should_stop(&mut self, sequences: &[Vec<u32>]) -> bool {
        if self.sentinel.is_empty() {
            return false;
        }
        sequences.iter().any(|candidate| {
            let generated = &candidate[self.start_offset.min(candidate.len())..];
            generated
                .windows(self.sentinel.len())
                .any(|window| window == self.sentinel)
        })
    }
}

/// Relays each newly produced token of the first candidate to a callback.
///
/// Purely an observer: it never requests a stop.
pub struct TokenRelay<F> {
    callback: F,
}

impl<F> TokenRelay<F>
where
    F: FnMut(u32) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> StoppingCriteria for TokenRelay<F>
where
    F: FnMut(u32) + Send,
{
    fn should_stop(&mut self, sequences: &[Vec<u32>]) -> bool {
        if let Some(token) = sequences.first().and_then(|candidate| candidate.last()) {
            (self.callback)(*token);
        }
        false
    }
}
