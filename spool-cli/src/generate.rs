//! A scripted stand-in for a model generation loop.

use std::time::Duration;

use spool_core::{Emitter, SentinelMatcher, StoppingCriteria, TokenRelay};

use crate::config::GenParams;

/// Outcome of a simulated run, delivered through the bridge's completion
/// side once the consumer has drained the stream.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub generated: usize,
    pub stopped_early: bool,
}

/// Produce the scripted tokens one step at a time, polling the stopping
/// criteria after each step the way a sampling loop would.
pub fn run_scripted(
    prompt: Vec<u32>,
    script: Vec<u32>,
    mut matcher: SentinelMatcher,
    params: GenParams,
    emitter: Emitter<u32>,
) -> RunSummary {
    let mut relay = TokenRelay::new(|token| tracing::debug!(token, "step"));
    let mut sequence = prompt;
    let mut generated = 0usize;
    let mut stopped_early = false;

    for &token in script.iter().take(params.sample_len) {
        std::thread::sleep(Duration::from_millis(params.token_delay_ms));
        sequence.push(token);
        generated += 1;

        if emitter.emit(token).is_err() {
            tracing::warn!("consumer went away, aborting generation");
            stopped_early = true;
            break;
        }

        let batch = std::slice::from_ref(&sequence);
        relay.should_stop(batch);
        if matcher.should_stop(batch) {
            tracing::info!(generated, "sentinel matched, stopping generation");
            stopped_early = true;
            break;
        }
    }

    RunSummary {
        generated,
        stopped_early,
    }
}
