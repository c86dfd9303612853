//! Zero-phase Butterworth low-pass filtering.
//!
//! No crate in the retrieved corpus offers a zero-phase (forward-backward)
//! IIR filter design; this is a straightforward hand-rolled implementation,
//! explicitly sanctioned for signal-processing kernels without an obvious
//! library analogue. The design follows the standard bilinear-transform
//! construction of a digital Butterworth filter (prototype poles -> lowpass
//! frequency scaling -> bilinear transform -> cascaded biquad sections), and
//! `filtfilt` mirrors `scipy.signal.sosfiltfilt`'s odd-reflection edge
//! padding to keep edge transients small without committing to exact
//! numerical parity.

use rustfft::num_complex::Complex64;
use std::collections::HashMap;

/// Fixed filter order used throughout the pipeline (prefilter and every
/// activity-aware cutoff are all 4th-order Butterworth).
pub const ORDER: usize = 4;

/// One second-order (biquad) IIR section in direct-form II transposed,
/// `a0` normalized to 1.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// A cascade of biquads implementing one 4th-order Butterworth low-pass.
#[derive(Debug, Clone)]
pub struct Sos {
    pub sections: Vec<Biquad>,
}

impl Sos {
    /// Design a 4th-order zero-phase-ready Butterworth low-pass.
    ///
    /// `cutoff_hz` is clamped just under Nyquist to avoid a degenerate
    /// (infinite prewarp) design if the caller passes a cutoff at or above
    /// `fs_hz / 2`.
    pub fn design_lowpass4(cutoff_hz: f64, fs_hz: f64) -> Self {
        let nyquist = fs_hz / 2.0;
        let cutoff = cutoff_hz.min(nyquist * 0.999).max(1e-6);

        // Prewarp the digital cutoff to its analog equivalent for the
        // bilinear transform.
        let wa = 2.0 * fs_hz * (std::f64::consts::PI * cutoff / fs_hz).tan();

        // Normalized (cutoff = 1 rad/s) Butterworth prototype poles, order 4:
        // p_k = -exp(i*pi*m_k/(2N)), m_k in {-3,-1,1,3}.
        let n = ORDER as i32;
        let ms = [-3, -1, 1, 3];
        let proto_poles: Vec<Complex64> = ms
            .iter()
            .map(|&m| {
                let theta = std::f64::consts::PI * (m as f64) / (2.0 * n as f64);
                -Complex64::from_polar(1.0, theta)
            })
            .collect();

        // Lowpass frequency scaling: s -> s / wa.
        let analog_poles: Vec<Complex64> = proto_poles.iter().map(|p| p * wa).collect();
        let k_analog = wa.powi(n);

        // Bilinear transform (fs2 = 2*fs cancels the tan() prewarp factor).
        let fs2 = 2.0 * fs_hz;
        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|p| (fs2 + p) / (fs2 - p))
            .collect();

        let denom_prod: Complex64 = analog_poles.iter().map(|p| fs2 - p).product();
        let k_digital = (k_analog / denom_prod).re;

        // All-pole analog prototype maps to `order` digital zeros at z = -1.
        // Pair poles (0,3) and (1,2) into conjugate pairs (see module docs:
        // the m sequence is symmetric, so index i pairs with index n-1-i).
        let pairs = [(0usize, 3usize), (1usize, 2usize)];
        let mut sections = Vec::with_capacity(pairs.len());
        for (idx, &(i, j)) in pairs.iter().enumerate() {
            let p = digital_poles[i];
            debug_assert!((p - digital_poles[j].conj()).norm() < 1e-6);
            let a1 = -2.0 * p.re;
            let a2 = p.norm_sqr();
            // (z + 1)^2 = z^2 + 2z + 1; all section gain folded into the
            // first section so the cascade's overall DC gain is k_digital.
            let gain = if idx == 0 { k_digital } else { 1.0 };
            sections.push(Biquad {
                b0: gain,
                b1: 2.0 * gain,
                b2: gain,
                a1,
                a2,
            });
        }

        Sos { sections }
    }

    fn apply_forward(&self, x: &[f64]) -> Vec<f64> {
        let mut y = x.to_vec();
        for s in &self.sections {
            y = apply_biquad(s, &y);
        }
        y
    }

    /// Zero-phase forward-backward filter. Signals shorter than 2 samples
    /// are returned unchanged (nothing meaningful to filter).
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        if x.len() < 2 {
            return x.to_vec();
        }
        let padlen = (3 * 2 * self.sections.len()).min(x.len() - 1);
        let padded = odd_extend(x, padlen);
        let forward = self.apply_forward(&padded);
        let mut reversed = forward;
        reversed.reverse();
        let backward = self.apply_forward(&reversed);
        let mut result = backward;
        result.reverse();
        result[padlen..padlen + x.len()].to_vec()
    }
}

fn apply_biquad(c: &Biquad, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; x.len()];
    let mut z1 = 0.0;
    let mut z2 = 0.0;
    for (i, &xn) in x.iter().enumerate() {
        let yn = c.b0 * xn + z1;
        z1 = c.b1 * xn - c.a1 * yn + z2;
        z2 = c.b2 * xn - c.a2 * yn;
        y[i] = yn;
    }
    y
}

/// Odd-reflection edge extension (matches scipy's default `padtype='odd'`):
/// extends both ends by reflecting through the boundary sample so the
/// extended signal's derivative at the seam matches the original, which
/// keeps filtfilt's edge transients small.
fn odd_extend(x: &[f64], n: usize) -> Vec<f64> {
    if n == 0 {
        return x.to_vec();
    }
    let len = x.len();
    let mut left = Vec::with_capacity(n);
    for i in (1..=n).rev() {
        left.push(2.0 * x[0] - x[i.min(len - 1)]);
    }
    let mut right = Vec::with_capacity(n);
    for i in 1..=n {
        right.push(2.0 * x[len - 1] - x[(len - 1).saturating_sub(i)]);
    }
    let mut out = Vec::with_capacity(len + 2 * n);
    out.extend(left);
    out.extend_from_slice(x);
    out.extend(right);
    out
}

/// Caches `Sos` designs by `(cutoff_hz, order)` within one session run, so
/// the activity-aware filter (which may reuse Standing/Walking/... cutoffs
/// across many segments) only designs each distinct filter once.
#[derive(Default)]
pub struct FilterCache {
    cache: HashMap<u64, Sos>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Order is always [`ORDER`] in this pipeline; kept as a parameter to
    /// document the cache key's full shape per the concurrency model.
    pub fn get_or_design(&mut self, cutoff_hz: f64, fs_hz: f64) -> &Sos {
        let key = cutoff_hz.to_bits();
        self.cache
            .entry(key)
            .or_insert_with(|| Sos::design_lowpass4(cutoff_hz, fs_hz))
    }
}
