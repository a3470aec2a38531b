//! Lagged Pearson cross-correlation between rate signals.
//!
//! For a signal `a` (lagged) and a reference `b`, both of length `n`, and a one-sided number of
//! lags `bin_num`, the reference is restricted to its center region `b[bin_num..n - bin_num]`.
//! At lag `l` in `-bin_num..=bin_num`, the same number of samples is taken from `a` starting at
//! `bin_num + l`, and the Pearson coefficient between the two windows is computed.
//! Lagged windows are read in place from `a`, so a call only allocates a few vectors of the
//! window length whatever the number of lags.
//!
//! A window with zero variance yields a NaN coefficient at that lag.
//!
//! # Examples
//!
//! ```
//! use approx::assert_relative_eq;
//! use noise_corr::core::xcorr::cross_correlate;
//!
//! let a = [0.0, 1.0, 0.0, 2.0, 0.0, 1.0, 3.0, 0.0, 1.0, 0.0];
//! let correlogram = cross_correlate(&a, &a, 3).unwrap();
//!
//! assert_eq!(correlogram.len(), 7);
//! assert_relative_eq!(correlogram.at_lag(0).unwrap(), 1.0, epsilon = 1e-12);
//! ```
use nalgebra::DVectorView;
use rayon::prelude::*;

use super::rate::JitterEnsemble;
use super::MIN_PARALLEL_ROWS;
use crate::error::NCError;

/// Correlation coefficients indexed by lag, from `-bin_num` to `bin_num`.
#[derive(Debug, PartialEq, Clone)]
pub struct CrossCorrelogram {
    bin_num: usize,
    values: Vec<f64>,
}

impl CrossCorrelogram {
    /// Returns the one-sided number of lags.
    pub fn bin_num(&self) -> usize {
        self.bin_num
    }

    pub fn values(&self) -> &[f64] {
        &self.values[..]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the lags associated with the coefficients, in order.
    pub fn lags(&self) -> impl Iterator<Item = isize> {
        -(self.bin_num as isize)..=self.bin_num as isize
    }

    /// Returns the coefficient at the given lag, if within range.
    pub fn at_lag(&self, lag: isize) -> Option<f64> {
        let idx = lag + self.bin_num as isize;
        if idx < 0 {
            return None;
        }
        self.values.get(idx as usize).copied()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// One cross-correlogram per jittered replicate.
#[derive(Debug, PartialEq, Clone)]
pub struct ShuffleCorrelogramSet {
    bin_num: usize,
    correlograms: Vec<CrossCorrelogram>,
}

impl ShuffleCorrelogramSet {
    pub fn num_shuffles(&self) -> usize {
        self.correlograms.len()
    }

    /// Returns the number of lags of every correlogram.
    pub fn num_lags(&self) -> usize {
        2 * self.bin_num + 1
    }

    pub fn get(&self, k: usize) -> Option<&CrossCorrelogram> {
        self.correlograms.get(k)
    }

    pub fn iter(&self) -> std::slice::Iter<CrossCorrelogram> {
        self.correlograms.iter()
    }

    /// Flatten the set as a (num_shuffles x num_lags) matrix stored column by column.
    pub fn to_column_major(&self) -> Vec<f64> {
        (0..self.num_lags())
            .flat_map(|lag| self.correlograms.iter().map(move |c| c.values[lag]))
            .collect()
    }
}

/// Returns the number of lags of a correlogram with `bin_num` lags on each side.
pub fn num_lags(bin_num: usize) -> Result<usize, NCError> {
    bin_num
        .checked_mul(2)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| NCError::InvalidParameter(format!("too many lags: {}", bin_num)))
}

/// Compute the cross-correlogram of the signal `a`, lagged, against the fixed reference `b`.
/// The signals must have the same length, longer than `2 * bin_num`.
pub fn cross_correlate(a: &[f64], b: &[f64], bin_num: usize) -> Result<CrossCorrelogram, NCError> {
    if a.len() != b.len() {
        return Err(NCError::IncompatibleSignals(format!(
            "cannot correlate signals of {} and {} bins",
            a.len(),
            b.len()
        )));
    }
    let num_lags = num_lags(bin_num)?;
    if a.len() < num_lags {
        return Err(NCError::InvalidParameter(format!(
            "signals of {} bins are too short for {} lags on each side",
            a.len(),
            bin_num
        )));
    }
    let width = a.len() + 1 - num_lags;

    let y = DVectorView::from_slice(&b[bin_num..bin_num + width], width);
    let y_centered = y.add_scalar(-y.mean());
    let y_ss = y_centered.norm_squared();

    // Lagged windows are views into a, centered one at a time: memory stays linear in the length
    let values = (0..num_lags)
        .map(|i| {
            let x = DVectorView::from_slice(&a[i..i + width], width);
            let x_centered = x.add_scalar(-x.mean());
            x_centered.dot(&y_centered) / (x_centered.norm_squared() * y_ss).sqrt()
        })
        .collect();

    Ok(CrossCorrelogram { bin_num, values })
}

/// Correlate every jittered replicate of `a` with the replicate of `b` of the same index.
pub fn shuffle_correlograms(
    a: &JitterEnsemble,
    b: &JitterEnsemble,
    bin_num: usize,
) -> Result<ShuffleCorrelogramSet, NCError> {
    if a.num_replicates() != b.num_replicates() {
        return Err(NCError::IncompatibleSignals(format!(
            "cannot pair {} replicates with {} replicates",
            a.num_replicates(),
            b.num_replicates()
        )));
    }
    num_lags(bin_num)?;

    let correlograms = if a.num_replicates() >= MIN_PARALLEL_ROWS {
        a.par_iter()
            .zip(b.par_iter())
            .map(|(ra, rb)| cross_correlate(ra.values(), rb.values(), bin_num))
            .collect::<Result<Vec<CrossCorrelogram>, NCError>>()?
    } else {
        a.iter()
            .zip(b.iter())
            .map(|(ra, rb)| cross_correlate(ra.values(), rb.values(), bin_num))
            .collect::<Result<Vec<CrossCorrelogram>, NCError>>()?
    };

    Ok(ShuffleCorrelogramSet {
        bin_num,
        correlograms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::RateSignal;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Straightforward per-lag Pearson coefficient, for comparison.
    fn naive_pearson(a: &[f64], b: &[f64], bin_num: usize, lag: isize) -> f64 {
        let width = a.len() - 2 * bin_num;
        let start = (bin_num as isize + lag) as usize;
        let x = &a[start..start + width];
        let y = &b[bin_num..bin_num + width];
        let mx = x.iter().sum::<f64>() / width as f64;
        let my = y.iter().sum::<f64>() / width as f64;
        let num: f64 = x.iter().zip(y).map(|(xi, yi)| (xi - mx) * (yi - my)).sum();
        let sx: f64 = x.iter().map(|xi| (xi - mx).powi(2)).sum();
        let sy: f64 = y.iter().map(|yi| (yi - my).powi(2)).sum();
        num / (sx * sy).sqrt()
    }

    fn rand_counts(len: usize, rng: &mut StdRng) -> Vec<f64> {
        (0..len).map(|_| rng.gen_range(0..4) as f64).collect()
    }

    #[test]
    fn test_against_naive_pearson() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = rand_counts(200, &mut rng);
        let b = rand_counts(200, &mut rng);

        let correlogram = cross_correlate(&a, &b, 10).unwrap();
        assert_eq!(correlogram.len(), 21);
        for (lag, r) in correlogram.lags().zip(correlogram.values()) {
            assert_relative_eq!(*r, naive_pearson(&a, &b, 10, lag), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_long_signal() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = rand_counts(100_000, &mut rng);
        let b = rand_counts(100_000, &mut rng);

        let correlogram = cross_correlate(&a, &b, 40).unwrap();
        assert_eq!(correlogram.len(), 81);
        for lag in [-40, -1, 0, 17, 40] {
            assert_relative_eq!(
                correlogram.at_lag(lag).unwrap(),
                naive_pearson(&a, &b, 40, lag),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_zero_lag_self_correlation() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = rand_counts(100, &mut rng);
        let correlogram = cross_correlate(&a, &a, 5).unwrap();
        assert_relative_eq!(correlogram.at_lag(0).unwrap(), 1.0, epsilon = 1e-12);
        assert!(correlogram.values().iter().all(|r| *r <= 1.0 + 1e-12));
    }

    #[test]
    fn test_lag_recovery() {
        // b is a delayed by 3 bins: the peak sits at lag -3
        let mut rng = StdRng::seed_from_u64(7);
        let a = rand_counts(300, &mut rng);
        let mut b = vec![0.0; 3];
        b.extend_from_slice(&a[..297]);

        let correlogram = cross_correlate(&a, &b, 5).unwrap();
        assert_relative_eq!(correlogram.at_lag(-3).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_symmetry() {
        // With quiet margins, swapping the signals mirrors the correlogram
        let bin_num = 4;
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = vec![0.0; 2 * bin_num];
        a.extend(rand_counts(50, &mut rng));
        a.extend(vec![0.0; 2 * bin_num]);
        let mut b = vec![0.0; 2 * bin_num];
        b.extend(rand_counts(50, &mut rng));
        b.extend(vec![0.0; 2 * bin_num]);

        let ab = cross_correlate(&a, &b, bin_num).unwrap();
        let ba = cross_correlate(&b, &a, bin_num).unwrap();
        for lag in ab.lags() {
            assert_relative_eq!(
                ab.at_lag(lag).unwrap(),
                ba.at_lag(-lag).unwrap(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_shape() {
        let a = vec![1.0, 0.0, 2.0, 0.0, 1.0];
        assert_eq!(cross_correlate(&a, &a, 2).unwrap().len(), 5);
        assert_eq!(cross_correlate(&a, &a, 0).unwrap().len(), 1);

        let long: Vec<f64> = (0..1000).map(|i| (i % 7) as f64).collect();
        assert_eq!(cross_correlate(&long, &long, 40).unwrap().len(), 81);
    }

    #[test]
    fn test_invalid_inputs() {
        let a = vec![1.0, 0.0, 2.0, 0.0];
        assert!(matches!(
            cross_correlate(&a, &a[..3], 1),
            Err(NCError::IncompatibleSignals(_))
        ));
        assert!(matches!(
            cross_correlate(&a, &a, 2),
            Err(NCError::InvalidParameter(_))
        ));
        assert!(matches!(
            cross_correlate(&a, &a, usize::MAX),
            Err(NCError::InvalidParameter(_))
        ));
        assert!(matches!(
            cross_correlate(&a, &a, usize::MAX / 2),
            Err(NCError::InvalidParameter(_))
        ));
        assert_eq!(num_lags(40), Ok(81));
        assert_eq!(num_lags(usize::MAX / 2), Ok(usize::MAX));
        assert!(num_lags(usize::MAX / 2 + 1).is_err());

        let ensemble = JitterEnsemble::build(vec![RateSignal::zeros(10); 2]).unwrap();
        assert!(matches!(
            shuffle_correlograms(&ensemble, &ensemble, usize::MAX),
            Err(NCError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_degenerate_signals() {
        // All-zero signals produce NaN at every lag without failing
        let zeros = vec![0.0; 40];
        let correlogram = cross_correlate(&zeros, &zeros, 2).unwrap();
        assert_eq!(correlogram.len(), 5);
        assert!(correlogram.values().iter().all(|r| r.is_nan()));

        // A single constant lagged window only affects its own lag
        let mut a = vec![0.0; 20];
        a[15] = 1.0;
        a[16] = 2.0;
        let b: Vec<f64> = (0..20).map(|i| (i % 3) as f64).collect();
        let correlogram = cross_correlate(&a, &b, 5).unwrap();
        // lag -5 covers a[0..10], which is constant
        assert!(correlogram.at_lag(-5).unwrap().is_nan());
        assert!(correlogram.at_lag(5).unwrap().is_finite());
    }

    #[test]
    fn test_lags() {
        let a: Vec<f64> = (0..10).map(|i| (i % 4) as f64).collect();
        let correlogram = cross_correlate(&a, &a, 2).unwrap();
        assert_eq!(correlogram.lags().collect::<Vec<isize>>(), vec![-2, -1, 0, 1, 2]);
        assert_eq!(correlogram.at_lag(3), None);
        assert_eq!(correlogram.at_lag(-3), None);
    }

    #[test]
    fn test_shuffle_correlograms() {
        let mut rng = StdRng::seed_from_u64(5);
        for num_shuffles in [3, 20] {
            let a = JitterEnsemble::build(
                (0..num_shuffles).map(|_| RateSignal::new(rand_counts(60, &mut rng))).collect(),
            )
            .unwrap();
            let b = JitterEnsemble::build(
                (0..num_shuffles).map(|_| RateSignal::new(rand_counts(60, &mut rng))).collect(),
            )
            .unwrap();

            let set = shuffle_correlograms(&a, &b, 4).unwrap();
            assert_eq!(set.num_shuffles(), num_shuffles);
            assert_eq!(set.num_lags(), 9);

            // Replicate k of a is only ever paired with replicate k of b
            for k in 0..num_shuffles {
                let expected = cross_correlate(
                    a.replicate(k).unwrap().values(),
                    b.replicate(k).unwrap().values(),
                    4,
                )
                .unwrap();
                assert_eq!(set.get(k), Some(&expected));
            }

            let flat = set.to_column_major();
            assert_eq!(flat.len(), num_shuffles * 9);
            assert_eq!(flat[1], set.get(1).unwrap().values()[0]);
            assert_eq!(flat[num_shuffles], set.get(0).unwrap().values()[1]);
        }

        let a = JitterEnsemble::build(vec![RateSignal::zeros(10); 2]).unwrap();
        let b = JitterEnsemble::build(vec![RateSignal::zeros(10); 3]).unwrap();
        assert!(shuffle_correlograms(&a, &b, 1).is_err());
    }
}
