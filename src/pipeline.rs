//! Orchestration of a noise correlation run for a single cluster pair.
//!
//! A run resolves the eligible clusters of a session, picks one pair of them according to the
//! batching policy, bins (and optionally jitters and smooths) both spike trains over the
//! tracking window, then correlates the real signals and every pair of jittered replicates.
use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::NoiseCorrConfig;
use crate::core::rate::{FiringRateBinner, JitterParams};
use crate::core::smoothing::GaussianSmoother;
use crate::core::spike_train::{SpikeTrain, TrackingWindow};
use crate::core::xcorr::{cross_correlate, shuffle_correlograms};
use crate::error::NCError;
use crate::record::NoiseCorrRecord;
use crate::session::SessionProvider;

/// Key of the random stream of the first spike train of a pair.
const KEY_A: u64 = 0;
/// Key of the random stream of the second spike train of a pair.
const KEY_B: u64 = 1;

/// Mapping from a job index to a position in the list of cluster pairs.
///
/// Jobs are distributed over pairs with a fixed stride, so that job `combo_idx` processes the
/// pair at position `combo_idx * stride`, which must be below `total_combinations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchingPolicy {
    pub total_combinations: usize,
    pub stride: usize,
}

impl Default for BatchingPolicy {
    fn default() -> Self {
        BatchingPolicy {
            total_combinations: 40186,
            stride: 113,
        }
    }
}

impl BatchingPolicy {
    pub fn validate(&self) -> Result<(), NCError> {
        if self.stride == 0 {
            return Err(NCError::InvalidParameter(
                "the batching stride must be at least 1".to_string(),
            ));
        }
        if self.total_combinations == 0 {
            return Err(NCError::InvalidParameter(
                "the total number of combinations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the position of the pair processed by job `combo_idx`.
    pub fn combination_index(&self, combo_idx: usize) -> Result<usize, NCError> {
        match combo_idx.checked_mul(self.stride) {
            Some(idx) if idx < self.total_combinations => Ok(idx),
            _ => Err(NCError::OutOfBounds(format!(
                "combination {} x {} exceeds the {} combinations",
                combo_idx, self.stride, self.total_combinations
            ))),
        }
    }
}

/// The noise correlation pipeline, built once from a validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseCorrelationPipeline {
    config: NoiseCorrConfig,
    seed: u64,
    binner: FiringRateBinner,
    smoother: Option<GaussianSmoother>,
}

impl NoiseCorrelationPipeline {
    /// Create a pipeline from the configuration.
    /// If no seed is configured, one is drawn at random and logged so that the run can be replayed.
    pub fn build(config: NoiseCorrConfig) -> Result<Self, NCError> {
        config.validate()?;

        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::thread_rng().gen::<u64>();
                log::info!("No seed configured, using seed {}", seed);
                seed
            }
        };

        let jitter = if config.to_jitter {
            Some(JitterParams::build(config.jitter_size, config.num_jitters, seed)?)
        } else {
            None
        };
        let binner = FiringRateBinner::build(config.bin_size, jitter)?;

        let smoother = if config.smooth_fr {
            let smoother = GaussianSmoother::build(config.std_smooth, config.bin_size)?;
            log::debug!("Smoothing rate signals with a kernel of {} bins", smoother.sigma());
            Some(smoother)
        } else {
            None
        };

        Ok(NoiseCorrelationPipeline {
            config,
            seed,
            binner,
            smoother,
        })
    }

    pub fn config(&self) -> &NoiseCorrConfig {
        &self.config
    }

    /// Returns the seed of the jitter generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Select the cluster pair of the configured job among the eligible clusters.
    /// Pairs are enumerated without repetition, in the order of the eligible clusters.
    pub fn select_pair(&self, eligible: &[String]) -> Result<(String, String), NCError> {
        let idx = self.config.batching.combination_index(self.config.combo_idx)?;
        eligible
            .iter()
            .tuple_combinations::<(_, _)>()
            .nth(idx)
            .map(|(a, b)| (a.clone(), b.clone()))
            .ok_or_else(|| {
                NCError::OutOfBounds(format!(
                    "no pair at position {} among {} eligible clusters",
                    idx,
                    eligible.len()
                ))
            })
    }

    /// Compute the cross-correlogram of two spike trains over the tracking window and,
    /// if jittering is enabled, the correlograms of their jittered replicates.
    pub fn correlate_pair(
        &self,
        train_a: &SpikeTrain,
        train_b: &SpikeTrain,
        tracking: &TrackingWindow,
    ) -> Result<NoiseCorrRecord, NCError> {
        let window = tracking.rebased();
        let prepare = |train: &SpikeTrain| {
            let clipped = tracking.clip(train);
            if clipped.is_empty() {
                log::warn!(
                    "Cluster {} has no spike in the tracking window [{}, {}]",
                    train.id(),
                    tracking.start(),
                    tracking.stop()
                );
            }
            tracking.rebase(&clipped)
        };
        let train_a = prepare(train_a);
        let train_b = prepare(train_b);

        let mut binned_a = self.binner.bin(&train_a, window.start(), window.stop(), KEY_A)?;
        let mut binned_b = self.binner.bin(&train_b, window.start(), window.stop(), KEY_B)?;
        log::debug!(
            "Binned {} and {} spikes into {} bins",
            train_a.len(),
            train_b.len(),
            binned_a.signal.len()
        );

        if let Some(smoother) = &self.smoother {
            for binned in [&mut binned_a, &mut binned_b] {
                binned.signal = smoother.smooth_signal(&binned.signal);
                binned.ensemble = binned.ensemble.as_ref().map(|e| smoother.smooth_ensemble(e));
            }
            log::debug!("Smoothed rate signals");
        }

        let cross_corr = cross_correlate(
            binned_a.signal.values(),
            binned_b.signal.values(),
            self.config.bin_num,
        )?;
        log::info!(
            "Computed the cross-correlogram of {} and {}",
            train_a.id(),
            train_b.id()
        );

        let sh_corr = match (&binned_a.ensemble, &binned_b.ensemble) {
            (Some(ensemble_a), Some(ensemble_b)) => {
                let set = shuffle_correlograms(ensemble_a, ensemble_b, self.config.bin_num)?;
                log::info!("Computed {} shuffle correlograms", set.num_shuffles());
                Some(set)
            }
            _ => None,
        };

        Ok(NoiseCorrRecord::new(
            train_a.id(),
            train_b.id(),
            &cross_corr,
            sh_corr.as_ref(),
        ))
    }

    /// Run the pipeline on the session and return the record of the selected pair.
    pub fn run<S: SessionProvider>(&self, session: &S) -> Result<NoiseCorrRecord, NCError> {
        let eligible = session.eligible_clusters(&self.config.cluster_filter())?;
        let (id_a, id_b) = self.select_pair(&eligible)?;
        log::info!(
            "Job {} selected the pair {}-{} among {} eligible clusters",
            self.config.combo_idx,
            id_a,
            id_b,
            eligible.len()
        );

        let data = session.load_clusters(&[id_a.clone(), id_b.clone()])?;
        let train_a = data.spike_train(&id_a)?;
        let train_b = data.spike_train(&id_b)?;
        self.correlate_pair(train_a, train_b, &data.tracking)
    }

    /// Run the pipeline and save the record in the given directory.
    /// Returns the path of the written file.
    pub fn run_and_save<S: SessionProvider, P: AsRef<Path>>(
        &self,
        session: &S,
        save_dir: P,
    ) -> Result<PathBuf, NCError> {
        let record = self.run(session)?;
        let path = record.save_in(save_dir, self.config.output_format)?;
        log::info!("Saved {}", path.display());
        Ok(path)
    }
}
