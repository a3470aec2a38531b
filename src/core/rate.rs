//! Binning of spike trains into fixed-resolution rate signals.
//!
//! A spike at (window-relative) time `t` lands in bin `round(t / bin_size)`, where ties are
//! rounded half to even. Bin indices past the last bin are clipped to the last bin and
//! negative indices (only reachable once spikes are jittered) are clipped to the first
//! one, so that every spike that survives the filtering is counted exactly once.
//!
//! Jittered replicates are drawn from independent ChaCha streams, one per replicate,
//! so an ensemble is reproducible from its seed whatever the number of worker threads.
//!
//! # Examples
//!
//! ```
//! use noise_corr::core::rate::{FiringRateBinner, JitterParams};
//! use noise_corr::core::spike_train::SpikeTrain;
//!
//! let spike_train = SpikeTrain::build("a", &[0.1, 0.2, 0.3]).unwrap();
//! let jitter = JitterParams::build(0.005, 100, 42).unwrap();
//! let binner = FiringRateBinner::build(0.01, Some(jitter)).unwrap();
//!
//! let binned = binner.bin(&spike_train, 0.0, 0.4, 0).unwrap();
//! assert_eq!(binned.signal.len(), 40);
//! assert_eq!(binned.signal.sum(), 3.0);
//!
//! let ensemble = binned.ensemble.unwrap();
//! assert_eq!(ensemble.num_replicates(), 100);
//! assert_eq!(ensemble.signal_len(), 40);
//! ```
use log;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;

use super::spike_train::SpikeTrain;
use super::MIN_PARALLEL_ROWS;
use crate::error::NCError;

/// A binned firing-rate signal, one value per bin.
/// Values are spike counts, or real values once smoothed.
#[derive(Debug, PartialEq, Clone)]
pub struct RateSignal(Vec<f64>);

impl RateSignal {
    pub fn new(values: Vec<f64>) -> Self {
        RateSignal(values)
    }

    /// An all-zero signal with the given number of bins.
    pub fn zeros(len: usize) -> Self {
        RateSignal(vec![0.0; len])
    }

    pub fn values(&self) -> &[f64] {
        &self.0[..]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the sum of all bins, i.e., the number of binned spikes before smoothing.
    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.0
    }
}

/// A collection of jittered rate signals, all of the same length.
#[derive(Debug, PartialEq, Clone)]
pub struct JitterEnsemble {
    replicates: Vec<RateSignal>,
    signal_len: usize,
}

impl JitterEnsemble {
    /// Build an ensemble from its replicates.
    /// Returns an error if the replicates do not share the same length.
    pub fn build(replicates: Vec<RateSignal>) -> Result<Self, NCError> {
        let signal_len = replicates.first().map_or(0, |r| r.len());
        if let Some(k) = replicates.iter().position(|r| r.len() != signal_len) {
            return Err(NCError::IncompatibleSignals(format!(
                "replicate {} has {} bins, expected {}",
                k,
                replicates[k].len(),
                signal_len
            )));
        }
        Ok(JitterEnsemble {
            replicates,
            signal_len,
        })
    }

    pub(crate) fn from_parts(replicates: Vec<RateSignal>, signal_len: usize) -> Self {
        JitterEnsemble {
            replicates,
            signal_len,
        }
    }

    pub fn num_replicates(&self) -> usize {
        self.replicates.len()
    }

    /// Returns the number of bins of every replicate.
    pub fn signal_len(&self) -> usize {
        self.signal_len
    }

    pub fn replicate(&self, k: usize) -> Option<&RateSignal> {
        self.replicates.get(k)
    }

    pub fn iter(&self) -> std::slice::Iter<RateSignal> {
        self.replicates.iter()
    }

    pub fn par_iter(&self) -> rayon::slice::Iter<RateSignal> {
        self.replicates.par_iter()
    }
}

/// Parameters of the spike jittering used to build the null distribution.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct JitterParams {
    /// One-sided bound of the uniform jitter, in seconds.
    size: f64,
    /// Number of jittered replicates.
    num_jitters: usize,
    /// Seed shared by all the replicates of a run.
    seed: u64,
}

impl JitterParams {
    pub fn build(size: f64, num_jitters: usize, seed: u64) -> Result<Self, NCError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(NCError::InvalidParameter(format!(
                "the jitter size must be positive, got {}",
                size
            )));
        }
        if num_jitters == 0 {
            return Err(NCError::InvalidParameter(
                "at least one jitter is required".to_string(),
            ));
        }
        Ok(JitterParams {
            size,
            num_jitters,
            seed,
        })
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn num_jitters(&self) -> usize {
        self.num_jitters
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// The output of the binner: the real signal and, if jittering is enabled, the jittered replicates.
#[derive(Debug, PartialEq, Clone)]
pub struct Binned {
    pub signal: RateSignal,
    pub ensemble: Option<JitterEnsemble>,
}

/// Converts spike trains into rate signals.
#[derive(Debug, PartialEq, Clone)]
pub struct FiringRateBinner {
    bin_size: f64,
    jitter: Option<JitterParams>,
}

impl FiringRateBinner {
    /// Create a binner with the given bin size (in seconds) and optional jittering.
    pub fn build(bin_size: f64, jitter: Option<JitterParams>) -> Result<Self, NCError> {
        if !bin_size.is_finite() || bin_size <= 0.0 {
            return Err(NCError::InvalidParameter(format!(
                "the bin size must be positive, got {}",
                bin_size
            )));
        }
        Ok(FiringRateBinner { bin_size, jitter })
    }

    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    pub fn jitter(&self) -> Option<&JitterParams> {
        self.jitter.as_ref()
    }

    /// Bin the spike train over [window_start, window_end].
    ///
    /// The `key` separates the random streams of different spike trains binned with the
    /// same binner: two trains jittered with the same key would receive identical offsets.
    pub fn bin(
        &self,
        spike_train: &SpikeTrain,
        window_start: f64,
        window_end: f64,
        key: u64,
    ) -> Result<Binned, NCError> {
        if !(window_end > window_start) {
            return Err(NCError::InvalidParameter(format!(
                "the window end ({}) must follow the window start ({})",
                window_end, window_start
            )));
        }
        let n_bins = num_bins(window_end - window_start, self.bin_size);

        let signal = bin_spikes(
            spike_train.times().iter().copied(),
            window_start,
            self.bin_size,
            n_bins,
        );

        let ensemble = match &self.jitter {
            Some(params) => {
                log::debug!(
                    "Jittering cluster {} ({} spikes) {} times",
                    spike_train.id(),
                    spike_train.len(),
                    params.num_jitters
                );
                Some(jitter_ensemble(
                    spike_train.times(),
                    window_start,
                    window_end,
                    self.bin_size,
                    n_bins,
                    params,
                    key,
                ))
            }
            None => None,
        };

        Ok(Binned { signal, ensemble })
    }
}

/// Returns the number of bins needed to cover a window of the given duration.
pub fn num_bins(duration: f64, bin_size: f64) -> usize {
    (duration / bin_size).ceil() as usize
}

/// Returns the bin of a spike, clipped to [0, n_bins - 1].
pub fn bin_index(time: f64, window_start: f64, bin_size: f64, n_bins: usize) -> usize {
    let idx = ((time - window_start) / bin_size).round_ties_even();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(n_bins.saturating_sub(1))
    }
}

fn bin_spikes(
    times: impl Iterator<Item = f64>,
    window_start: f64,
    bin_size: f64,
    n_bins: usize,
) -> RateSignal {
    let mut counts = vec![0.0; n_bins];
    for t in times {
        counts[bin_index(t, window_start, bin_size, n_bins)] += 1.0;
    }
    RateSignal(counts)
}

fn jitter_ensemble(
    times: &[f64],
    window_start: f64,
    window_end: f64,
    bin_size: f64,
    n_bins: usize,
    params: &JitterParams,
    key: u64,
) -> JitterEnsemble {
    let uniform = Uniform::new_inclusive(-params.size, params.size);

    let replicate = |k: usize| {
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(key));
        rng.set_stream(k as u64);
        // Only spikes pushed past the end of the window are dropped
        let jittered = times
            .iter()
            .map(|t| t + uniform.sample(&mut rng))
            .filter(|&t| t <= window_end)
            .collect::<Vec<f64>>();
        bin_spikes(jittered.into_iter(), window_start, bin_size, n_bins)
    };

    let replicates: Vec<RateSignal> = if params.num_jitters >= MIN_PARALLEL_ROWS {
        (0..params.num_jitters).into_par_iter().map(replicate).collect()
    } else {
        (0..params.num_jitters).map(replicate).collect()
    };

    JitterEnsemble {
        replicates,
        signal_len: n_bins,
    }
}
