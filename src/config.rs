//! Configuration of a noise correlation run.
//!
//! Every option has a default, so a configuration file only needs to list the options that
//! differ from it. Unknown options are rejected and the configuration is validated once,
//! when it is loaded.
//!
//! ```
//! use noise_corr::config::NoiseCorrConfig;
//!
//! let config: NoiseCorrConfig = serde_json::from_str(r#"{"bin_num": 20, "to_jitter": false}"#).unwrap();
//! assert_eq!(config.bin_num, 20);
//! assert_eq!(config.bin_size, 0.0005);
//! assert!(config.validate().is_ok());
//! ```
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::core::xcorr;
use crate::error::NCError;
use crate::pipeline::BatchingPolicy;
use crate::record::OutputFormat;
use crate::session::{ClusterFilter, ClusterType, SpikingProfile};

/// All the options of a noise correlation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseCorrConfig {
    /// The size of the bins used to bin spikes, in seconds.
    pub bin_size: f64,
    /// The one-sided number of lags (in bins) of the cross-correlogram.
    pub bin_num: usize,
    /// Whether to smooth the rate signals before correlating them.
    pub smooth_fr: bool,
    /// The standard deviation of the Gaussian smoothing kernel, in seconds.
    pub std_smooth: f64,
    /// Whether to jitter spikes to build the shuffle distribution.
    pub to_jitter: bool,
    /// The number of jittered replicates.
    pub num_jitters: usize,
    /// The one-sided bound of the spike jitter, in seconds.
    pub jitter_size: f64,
    /// Areas to include, specific (e.g. "M1") or general (A, M, P, S, V); all if None.
    pub area_filter: Option<Vec<String>>,
    /// Cluster type to include; all if None.
    pub cluster_type_filter: Option<ClusterType>,
    /// Spiking profile to include; all if None.
    pub profile_filter: Option<SpikingProfile>,
    /// Whether to order the clusters by channel number before pairing them.
    pub sort_ch_num: bool,
    /// Index of the batch of cluster pairs to process.
    pub combo_idx: usize,
    /// Seed of the jitter generator; drawn at random if None.
    pub seed: Option<u64>,
    /// File format of the output record.
    pub output_format: OutputFormat,
    /// Mapping from `combo_idx` to a cluster pair.
    pub batching: BatchingPolicy,
}

impl Default for NoiseCorrConfig {
    fn default() -> Self {
        NoiseCorrConfig {
            bin_size: 0.0005,
            bin_num: 40,
            smooth_fr: false,
            std_smooth: 0.001,
            to_jitter: true,
            num_jitters: 1000,
            jitter_size: 0.005,
            area_filter: None,
            cluster_type_filter: None,
            profile_filter: None,
            sort_ch_num: false,
            combo_idx: 0,
            seed: None,
            output_format: OutputFormat::default(),
            batching: BatchingPolicy::default(),
        }
    }
}

impl NoiseCorrConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, NCError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: NoiseCorrConfig =
            serde_json::from_reader(reader).map_err(|e| NCError::IOError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the consistency of all options.
    pub fn validate(&self) -> Result<(), NCError> {
        if !self.bin_size.is_finite() || self.bin_size <= 0.0 {
            return Err(NCError::InvalidParameter(format!(
                "bin_size must be positive, got {}",
                self.bin_size
            )));
        }
        xcorr::num_lags(self.bin_num)?;
        if self.smooth_fr && (!self.std_smooth.is_finite() || self.std_smooth <= 0.0) {
            return Err(NCError::InvalidParameter(format!(
                "std_smooth must be positive, got {}",
                self.std_smooth
            )));
        }
        if self.to_jitter {
            if !self.jitter_size.is_finite() || self.jitter_size <= 0.0 {
                return Err(NCError::InvalidParameter(format!(
                    "jitter_size must be positive, got {}",
                    self.jitter_size
                )));
            }
            if self.num_jitters == 0 {
                return Err(NCError::InvalidParameter(
                    "num_jitters must be at least 1".to_string(),
                ));
            }
        }
        self.batching.validate()
    }

    /// The filter selecting the eligible clusters.
    pub fn cluster_filter(&self) -> ClusterFilter {
        ClusterFilter {
            areas: self.area_filter.clone(),
            cluster_type: self.cluster_type_filter,
            profile: self.profile_filter,
            sort_ch_num: self.sort_ch_num,
        }
    }
}
