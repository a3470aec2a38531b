//! Core module defining the numerical building blocks of the noise correlation pipeline.
//!
//! It consists of the following components:
//!
//! - [`spike_train`]: Spike trains and the tracking window used to clip them
//! - [`rate`]: Binning of spike times into rate signals, with optional jittered replicates
//! - [`smoothing`]: Gaussian smoothing of rate signals
//! - [`xcorr`]: Lagged Pearson cross-correlation between rate signals
//!
//! # Examples
//!
//! ```
//! use noise_corr::core::rate::FiringRateBinner;
//! use noise_corr::core::spike_train::{SpikeTrain, TrackingWindow};
//! use noise_corr::core::xcorr::cross_correlate;
//!
//! let window = TrackingWindow::build(0.0, 0.4).unwrap();
//! let train_a = SpikeTrain::build("a", &[0.1, 0.2, 0.31]).unwrap();
//! let train_b = SpikeTrain::build("b", &[0.1, 0.2, 0.3]).unwrap();
//!
//! let binner = FiringRateBinner::build(0.01, None).unwrap();
//! let fr_a = binner.bin(&train_a, window.start(), window.stop(), 0).unwrap().signal;
//! let fr_b = binner.bin(&train_b, window.start(), window.stop(), 0).unwrap().signal;
//! assert_eq!(fr_a.len(), 40);
//!
//! let correlogram = cross_correlate(fr_a.values(), fr_b.values(), 2).unwrap();
//! assert_eq!(correlogram.len(), 5);
//! ```
pub mod rate;
pub mod smoothing;
pub mod spike_train;
pub mod xcorr;

/// Number of standard deviations covered by the Gaussian smoothing kernel on each side.
pub const GAUSSIAN_TRUNCATE: f64 = 4.0;
/// Minimum number of rows to consider parallel processing.
pub const MIN_PARALLEL_ROWS: usize = 16;
