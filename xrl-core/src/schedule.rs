//! Exploration schedule.
use crate::error::XrlError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Exponentially decaying exploration probability.
///
/// `epsilon(step) = eps_end + (eps_start - eps_end) * exp(-step / eps_decay)`
///
/// The value depends only on the global step, so a run restored from a
/// checkpoint continues the schedule where it stopped.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EpsilonSchedule {
    /// Exploration probability at step 0.
    pub eps_start: f64,

    /// Asymptotic exploration probability.
    pub eps_end: f64,

    /// Decay constant in steps.
    pub eps_decay: f64,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            eps_start: 0.9,
            eps_end: 0.02,
            eps_decay: 500_000.0,
        }
    }
}

impl EpsilonSchedule {
    /// Constructs a validated schedule.
    pub fn new(eps_start: f64, eps_end: f64, eps_decay: f64) -> Result<Self> {
        let schedule = Self {
            eps_start,
            eps_end,
            eps_decay,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Checks that all parameters are positive and finite with `eps_end < eps_start`.
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.eps_start) && positive(self.eps_end) && positive(self.eps_decay)) {
            return Err(XrlError::InvalidConfig(format!(
                "epsilon schedule parameters must be positive and finite: {:?}",
                self
            ))
            .into());
        }
        if self.eps_end >= self.eps_start {
            return Err(XrlError::InvalidConfig(format!(
                "eps_end ({}) must be smaller than eps_start ({})",
                self.eps_end, self.eps_start
            ))
            .into());
        }
        Ok(())
    }

    /// Exploration probability at the given global step.
    #[inline]
    pub fn epsilon(&self, step: u64) -> f64 {
        self.eps_end + (self.eps_start - self.eps_end) * (-(step as f64) / self.eps_decay).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_at_zero() -> Result<()> {
        let s = EpsilonSchedule::new(0.9, 0.02, 1000.0)?;
        assert_eq!(s.epsilon(0), 0.9);
        Ok(())
    }

    #[test]
    fn test_epsilon_decreases_to_end() -> Result<()> {
        let s = EpsilonSchedule::new(1.0, 0.05, 200.0)?;
        let mut prev = s.epsilon(0);
        for step in 1..5000 {
            let eps = s.epsilon(step);
            assert!(eps < prev, "not decreasing at step {}", step);
            assert!(eps > s.eps_end);
            prev = eps;
        }
        assert!((s.epsilon(1_000_000) - 0.05).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_epsilon_value() -> Result<()> {
        let s = EpsilonSchedule::new(0.9, 0.1, 100.0)?;
        let expected = 0.1 + 0.8 * (-1f64).exp();
        assert!((s.epsilon(100) - expected).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(EpsilonSchedule::new(0.1, 0.5, 100.0).is_err());
        assert!(EpsilonSchedule::new(0.5, 0.5, 100.0).is_err());
        assert!(EpsilonSchedule::new(0.9, 0.0, 100.0).is_err());
        assert!(EpsilonSchedule::new(0.9, 0.1, 0.0).is_err());
        assert!(EpsilonSchedule::new(0.9, 0.1, f64::NAN).is_err());
    }
}
