//! Smoothing and alignment of intensity profiles.
//!
//! Profiles are low-pass filtered with a digital Butterworth filter run
//! forward and backward (zero phase), and aligned on a landmark index found
//! in the filtered signal.

use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

use ndarray::{Array1, ArrayView1, s};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{AbsorptionError, Result};

const MAX_ORDER: usize = 10;

/// Order and cutoff of a low-pass Butterworth filter. `cutoff` is a
/// fraction of the Nyquist frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub order: usize,
    pub cutoff: f64,
}

impl FilterConfig {
    /// Preset used before locating the fit interval.
    pub const FIT: Self = Self {
        order: 4,
        cutoff: 0.1,
    };

    /// Heavier smoothing used to align edges across acquisitions.
    pub const ALIGNMENT: Self = Self {
        order: 3,
        cutoff: 0.025,
    };

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ORDER).contains(&self.order) {
            return Err(AbsorptionError::InvalidFilter(format!(
                "order must be between 1 and {MAX_ORDER}, got {}",
                self.order
            )));
        }
        if !(self.cutoff > 0.0 && self.cutoff < 1.0) {
            return Err(AbsorptionError::InvalidFilter(format!(
                "cutoff must lie in (0, 1), got {}",
                self.cutoff
            )));
        }
        Ok(())
    }

    pub fn apply(&self, profile: ArrayView1<f64>) -> Result<Array1<f64>> {
        Butterworth::design(*self)?.filtfilt(profile)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::FIT
    }
}

/// Transfer function coefficients `b / a` of a digital low-pass
/// Butterworth filter, `a[0] == 1`.
#[derive(Debug, Clone)]
pub struct Butterworth {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl Butterworth {
    /// Analog prototype poles scaled to the pre-warped cutoff, mapped to
    /// the z-plane with the bilinear transform (sampling rate 2, so the
    /// Nyquist frequency is 1). All zeros land on `z = -1`.
    pub fn design(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let FilterConfig { order, cutoff } = config;
        let fs2 = 4.0;
        let warped = fs2 * (PI * cutoff / 2.0).tan();

        let analog_poles = (0..order).map(|k| {
            let m = 2.0 * k as f64 + 1.0 - order as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64)) * warped
        });

        let mut gain = Complex64::new(warped.powi(order as i32), 0.0);
        let mut z_poles = Vec::with_capacity(order);
        for p in analog_poles {
            gain /= fs2 - p;
            z_poles.push((fs2 + p) / (fs2 - p));
        }

        let b = binomial_row(order)
            .into_iter()
            .map(|c| c * gain.re)
            .collect();
        let a = poly(&z_poles).into_iter().map(|c| c.re).collect();
        Ok(Self { b, a })
    }

    pub fn order(&self) -> usize {
        self.a.len() - 1
    }

    pub fn coefficients(&self) -> (&[f64], &[f64]) {
        (&self.b, &self.a)
    }

    /// Samples mirrored (odd extension) at each end before filtering.
    fn padlen(&self, len: usize) -> usize {
        (3 * (self.order() + 1)).min(len.saturating_sub(1))
    }

    /// Zero-phase filtering. The output has the input's length; a constant
    /// input comes back unchanged. Non-finite samples are filled in first,
    /// see [`fill_non_finite`].
    pub fn filtfilt(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        let n = x.len();
        if n < 2 {
            return Err(AbsorptionError::SignalTooShort { len: n, required: 2 });
        }
        let x = fill_non_finite(x)?;
        let pad = self.padlen(n);
        let (first, last) = (x[0], x[n - 1]);

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
        ext.extend(x.iter().copied());
        ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));

        let zi = self.steady_state();
        let scaled = |x0: f64| zi.iter().map(|z| z * x0).collect::<Vec<_>>();

        let mut y = self.lfilter(&ext, scaled(ext[0]));
        y.reverse();
        let mut y = self.lfilter(&y, scaled(y[0]));
        y.reverse();

        Ok(Array1::from_vec(y).slice(s![pad..pad + n]).to_owned())
    }

    /// Direct form II transposed, starting from delay state `z`.
    fn lfilter(&self, x: &[f64], mut z: Vec<f64>) -> Vec<f64> {
        let order = self.order();
        let (b, a) = (&self.b, &self.a);
        x.iter()
            .map(|&xv| {
                let y = b[0] * xv + z[0];
                for i in 0..order - 1 {
                    z[i] = b[i + 1] * xv - a[i + 1] * y + z[i + 1];
                }
                z[order - 1] = b[order] * xv - a[order] * y;
                y
            })
            .collect()
    }

    /// Delay state of the filter after a unit step has settled.
    fn steady_state(&self) -> Vec<f64> {
        let gain = self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>();
        (1..=self.order())
            .map(|i| {
                (i..=self.order())
                    .map(|j| self.b[j] - self.a[j] * gain)
                    .sum()
            })
            .collect()
    }
}

/// Replaces NaN and infinite samples (the log of a dark column) by linear
/// interpolation between the nearest finite neighbours. Gaps at either end
/// take the value of the closest finite sample. Needs at least two finite
/// samples.
pub fn fill_non_finite(profile: ArrayView1<f64>) -> Result<Array1<f64>> {
    let finite: Vec<usize> = profile
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, _)| i)
        .collect();
    if finite.len() < 2 {
        return Err(AbsorptionError::InsufficientSamples(finite.len()));
    }
    let mut filled = profile.to_owned();
    if finite.len() == profile.len() {
        return Ok(filled);
    }

    let (head, tail) = (finite[0], finite[finite.len() - 1]);
    filled.slice_mut(s![..head]).fill(profile[head]);
    filled.slice_mut(s![tail + 1..]).fill(profile[tail]);
    for pair in finite.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        let step = (profile[right] - profile[left]) / (right - left) as f64;
        for i in left + 1..right {
            filled[i] = profile[left] + step * (i - left) as f64;
        }
    }
    Ok(filled)
}

fn binomial_row(n: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for k in 0..n {
        let next = row[k] * (n - k) as f64 / (k + 1) as f64;
        row.push(next);
    }
    row
}

/// Monic polynomial with the given roots, highest power first.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        coeffs.push(Complex64::new(0.0, 0.0));
        for j in (1..coeffs.len()).rev() {
            let prev = coeffs[j - 1];
            coeffs[j] -= r * prev;
        }
    }
    coeffs
}

/// Landmark used to align profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Steepest falling point: arg-min of the first difference.
    DerivativeMin,
    /// Steepest rising point: arg-max of the first difference.
    DerivativeMax,
    /// Peak of the profile itself.
    ValueMax,
}

impl Display for ReferenceMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceMode::DerivativeMin => write!(f, "steepest descent"),
            ReferenceMode::DerivativeMax => write!(f, "steepest ascent"),
            ReferenceMode::ValueMax => write!(f, "maximum"),
        }
    }
}

/// First discrete difference, one sample shorter than the input.
pub fn diff(profile: ArrayView1<f64>) -> Array1<f64> {
    if profile.len() < 2 {
        return Array1::zeros(0);
    }
    &profile.slice(s![1..]) - &profile.slice(s![..-1])
}

/// Index of the first maximum. NaN never wins.
pub fn argmax(values: ArrayView1<f64>) -> Option<usize> {
    first_extremum(values, |v, best| v > best)
}

/// Index of the first minimum. NaN never wins.
pub fn argmin(values: ArrayView1<f64>) -> Option<usize> {
    first_extremum(values, |v, best| v < best)
}

fn first_extremum(values: ArrayView1<f64>, better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if !better(v, b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Derivative modes return an index in `[0, len - 1)`, value mode one in
/// `[0, len)`.
pub fn reference_index(filtered: ArrayView1<f64>, mode: ReferenceMode) -> Result<usize> {
    let found = match mode {
        ReferenceMode::DerivativeMin => argmin(diff(filtered).view()),
        ReferenceMode::DerivativeMax => argmax(diff(filtered).view()),
        ReferenceMode::ValueMax => argmax(filtered),
    };
    found.ok_or(AbsorptionError::InsufficientSamples(filtered.len()))
}

/// Sample positions relative to `reference`, scaled by `resolution`.
pub fn aligned_axis(len: usize, reference: usize, resolution: f64) -> Array1<f64> {
    Array1::from_iter((0..len).map(|i| (i as f64 - reference as f64) * resolution))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "{actual:?} != {expected:?}");
        }
    }

    fn step(len: usize, at: usize, lo: f64, hi: f64) -> Array1<f64> {
        Array1::from_iter((0..len).map(|i| if i < at { lo } else { hi }))
    }

    #[test]
    fn first_order_half_band() {
        let filter = Butterworth::design(FilterConfig {
            order: 1,
            cutoff: 0.5,
        })
        .unwrap();
        let (b, a) = filter.coefficients();
        assert_close(b, &[0.5, 0.5], 1e-12);
        assert_close(a, &[1.0, 0.0], 1e-12);
    }

    #[test]
    fn fit_preset_coefficients() {
        let filter = Butterworth::design(FilterConfig::FIT).unwrap();
        let (b, a) = filter.coefficients();
        assert_close(
            b,
            &[
                0.000416599204407,
                0.001666396817626,
                0.002499595226440,
                0.001666396817626,
                0.000416599204407,
            ],
            1e-12,
        );
        assert_close(
            a,
            &[1.0, -3.180638548874719, 3.861194348994214, -2.112155355110969, 0.438265142261980],
            1e-9,
        );
        // unit gain at DC
        let dc = b.iter().sum::<f64>() / a.iter().sum::<f64>();
        assert!((dc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_configs() {
        for config in [
            FilterConfig { order: 0, cutoff: 0.1 },
            FilterConfig { order: 11, cutoff: 0.1 },
            FilterConfig { order: 2, cutoff: 0.0 },
            FilterConfig { order: 2, cutoff: 1.0 },
            FilterConfig { order: 2, cutoff: f64::NAN },
        ] {
            assert!(matches!(
                Butterworth::design(config),
                Err(AbsorptionError::InvalidFilter(_))
            ));
        }
    }

    #[test]
    fn filtering_preserves_length() {
        for config in [FilterConfig::FIT, FilterConfig::ALIGNMENT] {
            for len in [2, 3, 6, 15, 16, 100] {
                let x = Array1::from_iter((0..len).map(|i| (i as f64 * 0.3).sin()));
                assert_eq!(config.apply(x.view()).unwrap().len(), len);
            }
        }
    }

    #[test]
    fn constant_profile_is_unchanged() {
        for config in [FilterConfig::FIT, FilterConfig::ALIGNMENT] {
            let x = Array1::from_elem(40, 3.0);
            let y = config.apply(x.view()).unwrap();
            assert_close(y.as_slice().unwrap(), x.as_slice().unwrap(), 1e-9);
        }
    }

    #[test]
    fn too_short_to_filter() {
        let x = array![1.0];
        assert!(matches!(
            FilterConfig::FIT.apply(x.view()),
            Err(AbsorptionError::SignalTooShort { len: 1, required: 2 })
        ));
    }

    #[test]
    fn non_finite_samples_are_filled() {
        let x = array![f64::NEG_INFINITY, 1.0, f64::NAN, f64::NAN, 4.0, f64::INFINITY];
        let filled = fill_non_finite(x.view()).unwrap();
        assert_eq!(filled, array![1.0, 1.0, 2.0, 3.0, 4.0, 4.0]);

        let clean = array![1.0, 2.0, 3.0];
        assert_eq!(fill_non_finite(clean.view()).unwrap(), clean);

        assert!(matches!(
            fill_non_finite(array![f64::NAN, 2.0, f64::NEG_INFINITY].view()),
            Err(AbsorptionError::InsufficientSamples(1))
        ));
    }

    #[test]
    fn dark_sample_does_not_spread() {
        let mut x = Array1::from_iter((0..60).map(|i| (i as f64 * 0.1).sin()));
        let clean = FilterConfig::FIT.apply(x.view()).unwrap();
        x[20] = f64::NEG_INFINITY;
        let y = FilterConfig::FIT.apply(x.view()).unwrap();
        assert!(y.iter().all(|v| v.is_finite()));
        // far from the gap the output matches the clean filtering
        assert!((y[55] - clean[55]).abs() < 1e-3);

        let mut dark = Array1::from_elem(10, f64::NEG_INFINITY);
        dark[3] = 1.0;
        assert!(matches!(
            FilterConfig::FIT.apply(dark.view()),
            Err(AbsorptionError::InsufficientSamples(1))
        ));
    }

    #[test]
    fn filtering_has_no_lag() {
        // a symmetric bump stays centred
        let x = Array1::from_iter((0..101).map(|i| (-((i as f64 - 50.0) / 8.0).powi(2)).exp()));
        let y = FilterConfig::FIT.apply(x.view()).unwrap();
        assert_eq!(argmax(y.view()), Some(50));
        assert!(y[50] < x[50]);
    }

    #[test]
    fn first_occurrence_wins_ties() {
        let x = array![1.0, 5.0, f64::NAN, 5.0, 0.0, 0.0];
        assert_eq!(argmax(x.view()), Some(1));
        assert_eq!(argmin(x.view()), Some(4));
        assert_eq!(argmax(array![f64::NAN, f64::NAN].view()), None);
        assert_eq!(argmax(Array1::<f64>::zeros(0).view()), None);
    }

    #[test]
    fn reference_modes() {
        let rising = step(100, 50, 1.0, 3.0);
        let filtered = FilterConfig::ALIGNMENT.apply(rising.view()).unwrap();
        assert_eq!(
            reference_index(filtered.view(), ReferenceMode::DerivativeMax).unwrap(),
            49
        );

        let falling = step(100, 50, 3.0, 1.0);
        let filtered = FilterConfig::ALIGNMENT.apply(falling.view()).unwrap();
        assert_eq!(
            reference_index(filtered.view(), ReferenceMode::DerivativeMin).unwrap(),
            49
        );

        let peak = array![0.0, 1.0, 4.0, 2.0, 4.0];
        assert_eq!(reference_index(peak.view(), ReferenceMode::ValueMax).unwrap(), 2);
    }

    #[test]
    fn reference_index_ranges() {
        for len in [2, 5, 30] {
            let x = Array1::from_iter((0..len).map(|i| ((i * 7919) % 13) as f64));
            let d = reference_index(x.view(), ReferenceMode::DerivativeMin).unwrap();
            let u = reference_index(x.view(), ReferenceMode::DerivativeMax).unwrap();
            let v = reference_index(x.view(), ReferenceMode::ValueMax).unwrap();
            assert!(d < len - 1 && u < len - 1);
            assert!(v < len);
        }
        let single = array![2.0];
        assert!(matches!(
            reference_index(single.view(), ReferenceMode::DerivativeMax),
            Err(AbsorptionError::InsufficientSamples(1))
        ));
        assert_eq!(reference_index(single.view(), ReferenceMode::ValueMax).unwrap(), 0);
    }

    #[test]
    fn axis_is_centred_on_reference() {
        let axis = aligned_axis(5, 2, 5.26);
        assert_close(
            axis.as_slice().unwrap(),
            &[-10.52, -5.26, 0.0, 5.26, 10.52],
            1e-12,
        );
    }

    #[test]
    fn diff_is_one_shorter() {
        assert_eq!(diff(array![1.0, 4.0, 2.0].view()), array![3.0, -2.0]);
        assert_eq!(diff(array![1.0].view()).len(), 0);
    }
}
