//! Sparse triangular Mel filters and the projection from a magnitude
//! spectrum onto a Mel-scale feature vector.

use crate::error::{PipelineError, Result};
use crate::fixed::{clip_q63_to_q15, Q15};

/// One triangular filter over a contiguous run of spectrum bins.
///
/// `weights[k]` applies to magnitude bin `offset + k`.
pub struct MelTriangle {
    pub offset: usize,
    pub weights: Vec<Q15>,
}

impl MelTriangle {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// True when `bin` lies under this triangle.
    pub fn covers(&self, bin: usize) -> bool {
        bin >= self.offset && bin < self.offset + self.weights.len()
    }
}

/// A fixed table of [`MelTriangle`]s, validated once against the spectrum
/// geometry at construction rather than on every projection.
pub struct MelFilterBank {
    triangles: Vec<MelTriangle>,
    half_fft_len: usize,
}

impl MelFilterBank {
    pub fn new(triangles: Vec<MelTriangle>, half_fft_len: usize) -> Result<Self> {
        for (index, t) in triangles.iter().enumerate() {
            let end = t.offset + t.weights.len();
            if end > half_fft_len {
                return Err(PipelineError::FilterOutOfRange {
                    index,
                    offset: t.offset,
                    end,
                    limit: half_fft_len,
                });
            }
        }
        Ok(Self {
            triangles,
            half_fft_len,
        })
    }

    /// Build a standard Mel-scale bank of `num_filters` triangles covering
    /// 0..sample_rate/2 over an `fft_len`-point spectrum.
    pub fn mel(num_filters: usize, fft_len: usize, sample_rate_hz: u32) -> Result<Self> {
        if num_filters == 0 {
            return Err(PipelineError::InvalidConfig(
                "mel bank needs at least one filter".into(),
            ));
        }
        let half = fft_len / 2;
        if half < num_filters + 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "{num_filters} mel filters do not fit in {half} spectrum bins"
            )));
        }

        let hz_to_mel = |hz: f64| 2595.0 * (1.0 + hz / 700.0).log10();
        let mel_to_hz = |mel: f64| 700.0 * (10f64.powf(mel / 2595.0) - 1.0);

        let mel_max = hz_to_mel(sample_rate_hz as f64 / 2.0);
        // num_filters + 2 edge points, mapped onto spectrum bin centers.
        let edges: Vec<usize> = (0..num_filters + 2)
            .map(|i| {
                let hz = mel_to_hz(mel_max * i as f64 / (num_filters + 1) as f64);
                let bin = (hz * fft_len as f64 / sample_rate_hz as f64).floor() as usize;
                bin.min(half - 1)
            })
            .collect();

        let mut triangles = Vec::with_capacity(num_filters);
        for m in 0..num_filters {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            let rise = (center - left).max(1) as f64;
            let fall = (right - center).max(1) as f64;
            let offset = left + 1;
            let end = right.max(offset + 1);
            // Dense banks can collapse adjacent edges onto one bin; the
            // saturating differences keep a degenerate triangle at weight
            // zero instead of wrapping.
            let weights = (offset..end)
                .map(|bin| {
                    let w = if bin <= center {
                        bin.saturating_sub(left) as f64 / rise
                    } else {
                        right.saturating_sub(bin) as f64 / fall
                    };
                    (w.clamp(0.0, 1.0) * 32_767.0).round() as Q15
                })
                .collect();
            triangles.push(MelTriangle { offset, weights });
        }
        Self::new(triangles, half)
    }

    pub fn num_filters(&self) -> usize {
        self.triangles.len()
    }

    pub fn half_fft_len(&self) -> usize {
        self.half_fft_len
    }

    pub fn triangles(&self) -> &[MelTriangle] {
        &self.triangles
    }

    /// Dot product of each triangle against its magnitude-spectrum slice.
    ///
    /// Products are Q30; the accumulator is 64-bit and only narrowed (with
    /// saturation) once per coefficient.
    pub fn project(&self, magnitude: &[Q15], out: &mut [Q15]) {
        assert!(magnitude.len() >= self.half_fft_len);
        assert_eq!(out.len(), self.triangles.len());
        for (coef, t) in out.iter_mut().zip(&self.triangles) {
            let slice = &magnitude[t.offset..t.offset + t.weights.len()];
            let mut acc: i64 = 0;
            for (&m, &w) in slice.iter().zip(&t.weights) {
                acc += m as i64 * w as i64;
            }
            *coef = clip_q63_to_q15(acc);
        }
    }
}
