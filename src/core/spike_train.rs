//! Module implementing spike trains and the tracking window they are clipped to.
use serde::{Deserialize, Serialize};

use crate::error::NCError;

/// Represents the spike times of a single cluster, in seconds.
/// The order of the spike times is kept as provided and never relied upon.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SpikeTrain {
    id: String,
    times: Vec<f64>,
}

impl SpikeTrain {
    /// Create a spike train with the specified parameters.
    /// The function returns an error for non-finite spike times.
    pub fn build(id: impl Into<String>, times: &[f64]) -> Result<Self, NCError> {
        let id = id.into();
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(NCError::InvalidSpikeTimes(format!(
                "cluster {} contains the non-finite spike time {}",
                id, t
            )));
        }

        Ok(SpikeTrain {
            id,
            times: times.to_vec(),
        })
    }

    /// Returns the ID of the cluster associated with the spike train.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the spike times of the spike train.
    pub fn times(&self) -> &[f64] {
        &self.times[..]
    }

    /// Returns the number of spikes.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Returns true if the spike train has no spike.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// The closed interval [start, stop] (in seconds) covered by the behavioral tracking.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct TrackingWindow {
    start: f64,
    stop: f64,
}

impl TrackingWindow {
    /// Create a tracking window; both bounds must be finite and `start < stop`.
    pub fn build(start: f64, stop: f64) -> Result<Self, NCError> {
        if !start.is_finite() || !stop.is_finite() {
            return Err(NCError::InvalidParameter(format!(
                "tracking bounds must be finite, got [{}, {}]",
                start, stop
            )));
        }
        if start >= stop {
            return Err(NCError::InvalidParameter(format!(
                "tracking start ({}) must precede tracking stop ({})",
                start, stop
            )));
        }
        Ok(TrackingWindow { start, stop })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.stop
    }

    /// Keep only the spikes falling inside the window, in their original order.
    /// Spike times are not shifted; an empty result is valid.
    pub fn clip(&self, spike_train: &SpikeTrain) -> SpikeTrain {
        SpikeTrain {
            id: spike_train.id.clone(),
            times: spike_train
                .times
                .iter()
                .copied()
                .filter(|&t| self.contains(t))
                .collect(),
        }
    }

    /// Express the spike times relative to the start of the window.
    pub fn rebase(&self, spike_train: &SpikeTrain) -> SpikeTrain {
        SpikeTrain {
            id: spike_train.id.clone(),
            times: spike_train.times.iter().map(|t| t - self.start).collect(),
        }
    }

    /// The window with its start moved to zero.
    pub fn rebased(&self) -> TrackingWindow {
        TrackingWindow {
            start: 0.0,
            stop: self.duration(),
        }
    }
}
