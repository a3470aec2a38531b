//! This crate computes noise correlations between the spike trains of pairs of neural clusters.
//!
//! Spike trains are clipped to the tracking window of their session, binned into rate signals
//! and correlated across a symmetric range of lags. A null distribution is built by jittering
//! spike times and correlating every pair of jittered replicates the same way.
//!
//! # Correlating Two Spike Trains
//!
//! ```rust
//! use noise_corr::config::NoiseCorrConfig;
//! use noise_corr::core::spike_train::{SpikeTrain, TrackingWindow};
//! use noise_corr::pipeline::NoiseCorrelationPipeline;
//!
//! let config = NoiseCorrConfig {
//!     bin_size: 0.01,
//!     bin_num: 2,
//!     num_jitters: 100,
//!     jitter_size: 0.02,
//!     seed: Some(42),
//!     ..Default::default()
//! };
//! let pipeline = NoiseCorrelationPipeline::build(config).unwrap();
//!
//! let tracking = TrackingWindow::build(0.0, 0.4).unwrap();
//! let train_a = SpikeTrain::build("imec0_cl0001_ch001", &[0.1, 0.2, 0.31]).unwrap();
//! let train_b = SpikeTrain::build("imec0_cl0002_ch002", &[0.1, 0.2, 0.3]).unwrap();
//!
//! let record = pipeline.correlate_pair(&train_a, &train_b, &tracking).unwrap();
//! assert_eq!(record.cross_corr.len(), 5);
//! assert_eq!(record.sh_corr.unwrap().rows(), 100);
//! ```
//!
//! # Running a Job on a Session
//!
//! A job selects one cluster pair of a session (see [`pipeline::BatchingPolicy`]), correlates
//! it, and saves the result as `<clusterA>-<clusterB>.mat` or `.json`:
//!
//! ```rust,no_run
//! use noise_corr::config::NoiseCorrConfig;
//! use noise_corr::pipeline::NoiseCorrelationPipeline;
//! use noise_corr::session::JsonSession;
//!
//! let config = NoiseCorrConfig::load_from("config.json").unwrap();
//! let session = JsonSession::load_from("bruno_020520_distal_s1_light.json").unwrap();
//! let pipeline = NoiseCorrelationPipeline::build(config).unwrap();
//! let path = pipeline.run_and_save(&session, "results").unwrap();
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod mat;
pub mod pipeline;
pub mod ratemap;
pub mod record;
pub mod session;
