//! Gaussian smoothing of rate signals along the time axis.
//!
//! The kernel is truncated at `GAUSSIAN_TRUNCATE` standard deviations and the signal is
//! extended past its ends by half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
use rayon::prelude::*;

use super::rate::{JitterEnsemble, RateSignal};
use super::{GAUSSIAN_TRUNCATE, MIN_PARALLEL_ROWS};
use crate::error::NCError;

/// Returns the normalized Gaussian kernel of the given standard deviation (in bins).
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Map an index of the extended signal back into [0, len).
fn reflect_index(i: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let m = i.rem_euclid(period);
    if m < len as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Smooth a signal with a Gaussian kernel of standard deviation `sigma` (in bins).
/// A zero standard deviation leaves the signal untouched.
pub fn gaussian_filter1d(signal: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || signal.is_empty() {
        return signal.to_vec();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    (0..signal.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * signal[reflect_index(i + k as isize - radius, signal.len())])
                .sum()
        })
        .collect()
}

/// Applies the same Gaussian smoothing to real and jittered rate signals.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct GaussianSmoother {
    /// Standard deviation of the kernel, in bins.
    sigma: usize,
}

impl GaussianSmoother {
    /// Create a smoother from a standard deviation in seconds, rounded to the nearest number of bins.
    pub fn build(std_smooth: f64, bin_size: f64) -> Result<Self, NCError> {
        if !std_smooth.is_finite() || std_smooth < 0.0 {
            return Err(NCError::InvalidParameter(format!(
                "the smoothing standard deviation must be non-negative, got {}",
                std_smooth
            )));
        }
        if !bin_size.is_finite() || bin_size <= 0.0 {
            return Err(NCError::InvalidParameter(format!(
                "the bin size must be positive, got {}",
                bin_size
            )));
        }
        Ok(GaussianSmoother {
            sigma: (std_smooth / bin_size).round() as usize,
        })
    }

    /// Returns the standard deviation of the kernel, in bins.
    pub fn sigma(&self) -> usize {
        self.sigma
    }

    pub fn smooth_signal(&self, signal: &RateSignal) -> RateSignal {
        RateSignal::new(gaussian_filter1d(signal.values(), self.sigma as f64))
    }

    /// Smooth every replicate independently.
    pub fn smooth_ensemble(&self, ensemble: &JitterEnsemble) -> JitterEnsemble {
        let replicates: Vec<RateSignal> = if ensemble.num_replicates() >= MIN_PARALLEL_ROWS {
            ensemble.par_iter().map(|r| self.smooth_signal(r)).collect()
        } else {
            ensemble.iter().map(|r| self.smooth_signal(r)).collect()
        };
        // Smoothing preserves the length of every replicate
        JitterEnsemble::from_parts(replicates, ensemble.signal_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_kernel() {
        let kernel = gaussian_kernel(1.0);
        assert_eq!(kernel.len(), 9);
        assert_relative_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(kernel[4], 0.3989422804, epsilon = 1e-5);
        assert_relative_eq!(kernel[3], kernel[5], epsilon = 1e-15);

        assert_eq!(gaussian_kernel(2.0).len(), 17);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(8, 4), 0);
        assert_eq!(reflect_index(2, 4), 2);
    }

    #[test]
    fn test_gaussian_filter1d() {
        // An impulse in the middle of a long signal reproduces the kernel
        let mut signal = vec![0.0; 21];
        signal[10] = 1.0;
        let smoothed = gaussian_filter1d(&signal, 1.0);
        let kernel = gaussian_kernel(1.0);
        for (k, w) in kernel.iter().enumerate() {
            assert_relative_eq!(smoothed[6 + k], w, epsilon = 1e-15);
        }
        assert_eq!(smoothed[0], 0.0);

        // Reflection at the boundaries keeps symmetric signals symmetric, even with a kernel wider than the signal
        let signal = vec![3.0, 0.0, 1.0, 1.0, 0.0, 3.0];
        let smoothed = gaussian_filter1d(&signal, 2.0);
        for i in 0..3 {
            assert_relative_eq!(smoothed[i], smoothed[5 - i], epsilon = 1e-12);
        }

        // Constant signals are left unchanged
        let smoothed = gaussian_filter1d(&[2.0; 7], 3.0);
        for v in smoothed {
            assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        }

        assert_eq!(gaussian_filter1d(&[1.0, 2.0], 0.0), vec![1.0, 2.0]);
    }

    #[test]
    fn test_smoother() {
        let smoother = GaussianSmoother::build(0.001, 0.0005).unwrap();
        assert_eq!(smoother.sigma(), 2);
        assert_eq!(GaussianSmoother::build(0.0001, 0.0005).unwrap().sigma(), 0);
        assert!(GaussianSmoother::build(-0.001, 0.0005).is_err());
        assert!(GaussianSmoother::build(0.001, 0.0).is_err());

        let signal = RateSignal::new(vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let ensemble = JitterEnsemble::build(vec![signal.clone(); 20]).unwrap();
        let smoothed = smoother.smooth_ensemble(&ensemble);
        assert_eq!(smoothed.num_replicates(), 20);
        assert!(smoothed.iter().all(|r| *r == smoother.smooth_signal(&signal)));
    }
}
