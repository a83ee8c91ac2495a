//! Signal conditioning, spectrum magnitude, and Mel projection: one raw
//! sample block in, one Q15 feature vector out.

use log::trace;

use crate::error::{PipelineError, Result};
use crate::fft::FftQ15;
use crate::fixed::{
    abs_q15, absmax_q15, add_q15, isqrt, recip_q15, sat_q31_to_q15, scale_by_recip_q15, Q15, Q31,
};
use crate::mel::MelFilterBank;

/// How the per-bin spectrum magnitude is estimated.
///
/// `Exact` is the Euclidean magnitude with dynamic-range rescaling around the
/// largest bin. The others trade accuracy for cycles, relative error against
/// the Euclidean magnitude:
/// - `AbsMax`: max(|re|, |im|), up to -29% (at |re| == |im|)
/// - `AbsSum`: |re| + |im|, up to +41% (at |re| == |im|)
/// - `PureMax`: |max(re, im)|, sign-blind; can pick the smaller component
/// - `PureSum`: |re + im|, sign-blind; components can cancel entirely
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MagnitudeMode {
    Exact,
    AbsMax,
    AbsSum,
    PureMax,
    PureSum,
}

/// DC offset removed after the 12-bit -> Q15 scale-up.
const DC_OFFSET: Q31 = 1 << 14;

pub struct SpectrogramEngine {
    fft: FftQ15,
    bank: MelFilterBank,
    mode: MagnitudeMode,
    window: Vec<Q15>,
    /// Interleaved (re, im) FFT scratch, 2 * samples_per_vector words.
    fft_buf: Vec<Q15>,
    /// Magnitude scratch, samples_per_vector / 2 bins.
    mag_buf: Vec<Q15>,
}

impl SpectrogramEngine {
    pub fn new(samples_per_vector: usize, mode: MagnitudeMode, bank: MelFilterBank) -> Result<Self> {
        let fft = FftQ15::new(samples_per_vector)?;
        if bank.half_fft_len() != samples_per_vector / 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "mel bank built for {} spectrum bins, engine produces {}",
                bank.half_fft_len(),
                samples_per_vector / 2
            )));
        }
        Ok(Self {
            fft,
            bank,
            mode,
            window: hamming_q15(samples_per_vector),
            fft_buf: vec![0; 2 * samples_per_vector],
            mag_buf: vec![0; samples_per_vector / 2],
        })
    }

    pub fn samples_per_vector(&self) -> usize {
        self.fft.len()
    }

    pub fn mel_vector_length(&self) -> usize {
        self.bank.num_filters()
    }

    pub fn bank(&self) -> &MelFilterBank {
        &self.bank
    }

    /// Condition one raw block in place: rescale the unsigned 12-bit samples
    /// to signed Q15, remove the DC offset, and apply the Hamming window.
    ///
    /// For `s` in [0, 4095] the result of every step stays within Q15.
    pub fn format(&self, samples: &mut [Q15]) {
        assert_eq!(samples.len(), self.fft.len());
        for (s, &w) in samples.iter_mut().zip(&self.window) {
            let centered = ((*s as Q31) << 3) - DC_OFFSET;
            *s = sat_q31_to_q15((centered * w as Q31) >> 15);
        }
    }

    /// Transform one conditioned block into a Mel feature vector.
    pub fn compute(&mut self, samples: &[Q15], out: &mut [Q15]) {
        assert_eq!(samples.len(), self.fft.len());
        assert_eq!(out.len(), self.bank.num_filters());

        for (pair, &s) in self.fft_buf.chunks_exact_mut(2).zip(samples) {
            pair[0] = s;
            pair[1] = 0;
        }
        self.fft.process(&mut self.fft_buf);

        let half = self.fft.len() / 2;
        // Only the first half of the symmetric spectrum carries information;
        // that is `half` complex pairs, i.e. the first `len` buffer words.
        let spectrum = &mut self.fft_buf[..2 * half];
        match self.mode {
            MagnitudeMode::Exact => exact_magnitude(spectrum, &mut self.mag_buf),
            approx => {
                for (bin, pair) in self.mag_buf.iter_mut().zip(spectrum.chunks_exact(2)) {
                    *bin = approx_magnitude(approx, pair[0], pair[1]);
                }
            }
        }
        trace!("magnitude peak {}", absmax_q15(&self.mag_buf));

        self.bank.project(&self.mag_buf, out);
    }
}

/// Q15 Hamming window, 0.54 - 0.46 cos(2 pi i / (n - 1)).
fn hamming_q15(n: usize) -> Vec<Q15> {
    (0..n)
        .map(|i| {
            let w = 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
            sat_q31_to_q15((w * 32_768.0).round() as Q31)
        })
        .collect()
}

/// Euclidean magnitude with dynamic-range rescaling: normalize the whole
/// spectrum by its largest component so the square root keeps precision for
/// small bins, then scale back.
fn exact_magnitude(spectrum: &mut [Q15], out: &mut [Q15]) {
    let vmax = absmax_q15(spectrum);
    if vmax == 0 {
        out.fill(0);
        return;
    }
    let recip = recip_q15(vmax);
    for x in spectrum.iter_mut() {
        *x = scale_by_recip_q15(*x, recip);
    }
    for (bin, pair) in out.iter_mut().zip(spectrum.chunks_exact(2)) {
        let re = pair[0] as i64;
        let im = pair[1] as i64;
        let mag = isqrt((re * re + im * im) as u32);
        let mag = if mag > Q15::MAX as u16 { Q15::MAX } else { mag as Q15 };
        *bin = sat_q31_to_q15((mag as Q31 * vmax as Q31) >> 15);
    }
}

fn approx_magnitude(mode: MagnitudeMode, re: Q15, im: Q15) -> Q15 {
    match mode {
        MagnitudeMode::AbsMax => abs_q15(re).max(abs_q15(im)),
        MagnitudeMode::AbsSum => add_q15(abs_q15(re), abs_q15(im)),
        MagnitudeMode::PureMax => abs_q15(re.max(im)),
        MagnitudeMode::PureSum => abs_q15(add_q15(re, im)),
        MagnitudeMode::Exact => unreachable!("exact mode handled on the whole spectrum"),
    }
}
