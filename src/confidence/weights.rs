// src/confidence/weights.rs
// Per-project Beta-distribution parameters mapping signal type -> weight
// (spec.md §3.3).

use serde::{Deserialize, Serialize};

use crate::confidence::signal::SignalType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaParams {
    fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

/// Normalized per-signal-type weights, for display rather than computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BetaMeans {
    pub explicit: f64,
    pub usage: f64,
    pub outcome: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWeights {
    pub project_id: String,
    pub explicit: BetaParams,
    pub usage: BetaParams,
    pub outcome: BetaParams,
}

impl ProjectWeights {
    /// Priors from spec.md §3.3: explicit trusted (70%), usage/outcome neutral.
    pub fn priors(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            explicit: BetaParams { alpha: 7.0, beta: 3.0 },
            usage: BetaParams { alpha: 5.0, beta: 5.0 },
            outcome: BetaParams { alpha: 5.0, beta: 5.0 },
        }
    }

    fn params_for(&self, signal_type: SignalType) -> BetaParams {
        match signal_type {
            SignalType::Explicit => self.explicit,
            SignalType::Usage => self.usage,
            SignalType::Outcome => self.outcome,
        }
    }

    fn params_mut(&mut self, signal_type: SignalType) -> &mut BetaParams {
        match signal_type {
            SignalType::Explicit => &mut self.explicit,
            SignalType::Usage => &mut self.usage,
            SignalType::Outcome => &mut self.outcome,
        }
    }

    /// Normalized weights: `w_T = mean_T / Σ mean` — sums to 1 (spec.md §3.3, §8).
    pub fn normalized(&self) -> [(SignalType, f64); 3] {
        let means: Vec<(SignalType, f64)> =
            SignalType::ALL.iter().map(|t| (*t, self.params_for(*t).mean())).collect();
        let total: f64 = means.iter().map(|(_, m)| m).sum();
        let mut result = [(SignalType::Explicit, 0.0), (SignalType::Usage, 0.0), (SignalType::Outcome, 0.0)];
        for (i, (t, m)) in means.into_iter().enumerate() {
            result[i] = (t, if total > 0.0 { m / total } else { 1.0 / 3.0 });
        }
        result
    }

    pub fn weight_for(&self, signal_type: SignalType) -> f64 {
        self.normalized().into_iter().find(|(t, _)| *t == signal_type).map(|(_, w)| w).unwrap_or(0.0)
    }

    /// Normalized weights keyed by name, for operator-facing introspection
    /// (`Service::debug_weights`) rather than internal scoring.
    pub fn as_beta_means(&self) -> BetaMeans {
        BetaMeans {
            explicit: self.weight_for(SignalType::Explicit),
            usage: self.weight_for(SignalType::Usage),
            outcome: self.weight_for(SignalType::Outcome),
        }
    }

    /// Naive online Beta update: a signal's direction that agreed with
    /// explicit feedback increments alpha for its type, a disagreement
    /// increments beta (spec.md §4.2 "Weight learning").
    pub fn reinforce(&mut self, signal_type: SignalType, agreed: bool) {
        let params = self.params_mut(signal_type);
        if agreed {
            params.alpha += 1.0;
        } else {
            params.beta += 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_weights_sum_to_one() {
        let weights = ProjectWeights::priors("p1");
        let sum: f64 = weights.normalized().iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn beta_means_match_weight_for() {
        let weights = ProjectWeights::priors("p1");
        let means = weights.as_beta_means();
        assert_eq!(means.explicit, weights.weight_for(SignalType::Explicit));
        assert_eq!(means.usage, weights.weight_for(SignalType::Usage));
        assert_eq!(means.outcome, weights.weight_for(SignalType::Outcome));
    }

    #[test]
    fn explicit_prior_dominates() {
        let weights = ProjectWeights::priors("p1");
        assert!(weights.weight_for(SignalType::Explicit) > weights.weight_for(SignalType::Usage));
        assert!(weights.weight_for(SignalType::Explicit) > weights.weight_for(SignalType::Outcome));
    }

    #[test]
    fn reinforcement_shifts_weight_toward_agreeing_type() {
        let mut weights = ProjectWeights::priors("p1");
        let before = weights.weight_for(SignalType::Usage);
        for _ in 0..5 {
            weights.reinforce(SignalType::Usage, true);
        }
        let after = weights.weight_for(SignalType::Usage);
        assert!(after > before);
    }
}
