//! In-place radix-2 complex FFT in Q15.
//!
//! Every butterfly stage halves its outputs, so intermediate values can never
//! overflow 16 bits regardless of input; the transform output is the true
//! spectrum scaled by 1/n. The twiddle table is built once at init.

use crate::error::{PipelineError, Result};
use crate::fixed::{sat_q31_to_q15, Q15};

pub struct FftQ15 {
    len: usize,
    stages: u32,
    /// Interleaved (re, im) of e^(-2*pi*i*k/n) for k in 0..n/2.
    twiddles: Vec<Q15>,
}

impl FftQ15 {
    /// Transform length must be a power of two of at least 8 points.
    pub fn new(len: usize) -> Result<Self> {
        if len < 8 || !len.is_power_of_two() {
            return Err(PipelineError::InvalidConfig(format!(
                "FFT length {len} is not a power of two >= 8"
            )));
        }
        let mut twiddles = Vec::with_capacity(len);
        for k in 0..len / 2 {
            let angle = -2.0 * std::f64::consts::PI * k as f64 / len as f64;
            twiddles.push((angle.cos() * 32_767.0).round() as Q15);
            twiddles.push((angle.sin() * 32_767.0).round() as Q15);
        }
        Ok(Self {
            len,
            stages: len.trailing_zeros(),
            twiddles,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// In-place transform of `len` interleaved (re, im) Q15 pairs.
    pub fn process(&self, buf: &mut [Q15]) {
        assert_eq!(buf.len(), 2 * self.len);

        // Bit-reversal reordering of the complex pairs.
        let mut j = 0usize;
        for i in 0..self.len {
            if i < j {
                buf.swap(2 * i, 2 * j);
                buf.swap(2 * i + 1, 2 * j + 1);
            }
            let mut mask = self.len >> 1;
            while mask > 0 && j & mask != 0 {
                j &= !mask;
                mask >>= 1;
            }
            j |= mask;
        }

        for stage in 1..=self.stages {
            let group = 1usize << stage;
            let half = group >> 1;
            let stride = self.len / group;
            for base in (0..self.len).step_by(group) {
                for k in 0..half {
                    let (wr, wi) = {
                        let t = 2 * k * stride;
                        (self.twiddles[t] as i32, self.twiddles[t + 1] as i32)
                    };
                    let ia = 2 * (base + k);
                    let ib = 2 * (base + k + half);
                    let ar = buf[ia] as i32;
                    let ai = buf[ia + 1] as i32;
                    let br = buf[ib] as i32;
                    let bi = buf[ib + 1] as i32;
                    let tr = (wr * br - wi * bi) >> 15;
                    let ti = (wr * bi + wi * br) >> 15;
                    buf[ia] = sat_q31_to_q15((ar + tr) >> 1);
                    buf[ia + 1] = sat_q31_to_q15((ai + ti) >> 1);
                    buf[ib] = sat_q31_to_q15((ar - tr) >> 1);
                    buf[ib + 1] = sat_q31_to_q15((ai - ti) >> 1);
                }
            }
        }
    }
}
