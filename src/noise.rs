//! Trembling-hand execution noise.

use rand::Rng;
use tracing::info;

use crate::payoff::StrategyKey;

/// With probability `epsilon`, the executed action is a uniformly chosen *different* action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TremblingHand {
    epsilon: f64,
}

impl TremblingHand {
    /// `epsilon` is clamped to `[0, 1]`.
    pub fn new(epsilon: f64) -> Self {
        let epsilon = if epsilon.is_nan() {
            0.0
        } else {
            epsilon.clamp(0.0, 1.0)
        };
        Self { epsilon }
    }

    /// Flip probability.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Executed action for `intended`, over a vocabulary of `options` strategies, and whether
    /// noise changed it. With fewer than two options the intended action always goes through.
    pub fn apply<R: Rng>(
        &self,
        agent: &str,
        intended: StrategyKey,
        options: usize,
        rng: &mut R,
    ) -> (StrategyKey, bool) {
        if options < 2 || self.epsilon == 0.0 || !rng.gen_bool(self.epsilon) {
            return (intended, false);
        }
        // draw among the other options: skip over the intended index
        let mut pick = rng.gen_range(0..options - 1);
        if pick >= intended.index() {
            pick += 1;
        }
        let executed = StrategyKey(pick);
        info!(agent, %intended, %executed, "trembling hand");
        (executed, true)
    }
}
