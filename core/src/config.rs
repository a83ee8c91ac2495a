//! Init-time configuration of the whole pipeline.
//!
//! Everything here is decided once, before acquisition starts; there are no
//! runtime knobs. Bad geometry is a startup abort, never a runtime surprise.

use crate::acquisition::AcquisitionPolicy;
use crate::auth::{CipherBackend, CipherKey};
use crate::error::{PipelineError, Result};
use crate::fixed::Q15;
use crate::spectrogram::MagnitudeMode;
use crate::threshold::ThresholdMode;
use crate::{
    DEFAULT_MEL_VECTOR_LENGTH, DEFAULT_SAMPLES_PER_VECTOR, DEFAULT_SAMPLE_RATE_HZ,
    DEFAULT_SENDER_ID, DEFAULT_VECTORS_PER_PACKET,
};

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Raw samples per feature vector; the FFT length. Power of two.
    pub samples_per_vector: usize,
    /// Feature vectors per transmitted packet.
    pub vectors_per_packet: usize,
    /// Mel coefficients per feature vector.
    pub mel_vector_length: usize,
    /// ADC sampling rate, used to lay out the Mel bank.
    pub sample_rate_hz: u32,
    pub magnitude_mode: MagnitudeMode,
    pub threshold_mode: ThresholdMode,
    /// Base value all threshold modes derive their corrected threshold from.
    pub threshold_base: Q15,
    pub cipher_backend: CipherBackend,
    pub cipher_key: CipherKey,
    pub acquisition_policy: AcquisitionPolicy,
    pub sender_id: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            samples_per_vector: DEFAULT_SAMPLES_PER_VECTOR,
            vectors_per_packet: DEFAULT_VECTORS_PER_PACKET,
            mel_vector_length: DEFAULT_MEL_VECTOR_LENGTH,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            magnitude_mode: MagnitudeMode::Exact,
            threshold_mode: ThresholdMode::Disabled,
            threshold_base: 5,
            cipher_backend: CipherBackend::Software,
            cipher_key: [0; 16],
            acquisition_policy: AcquisitionPolicy::Overlap,
            sender_id: DEFAULT_SENDER_ID,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_vector < 8 || !self.samples_per_vector.is_power_of_two() {
            return Err(PipelineError::InvalidConfig(format!(
                "samples_per_vector {} must be a power of two >= 8",
                self.samples_per_vector
            )));
        }
        if self.vectors_per_packet == 0 {
            return Err(PipelineError::InvalidConfig(
                "vectors_per_packet must be at least 1".into(),
            ));
        }
        if self.mel_vector_length == 0 {
            return Err(PipelineError::InvalidConfig(
                "mel_vector_length must be at least 1".into(),
            ));
        }
        if self.mel_vector_length > self.samples_per_vector / 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "{} mel coefficients cannot come out of {} spectrum bins",
                self.mel_vector_length,
                self.samples_per_vector / 2
            )));
        }
        if self.sample_rate_hz == 0 {
            return Err(PipelineError::InvalidConfig("sample_rate_hz is zero".into()));
        }
        let payload = 2 * self.vectors_per_packet * self.mel_vector_length;
        if payload > u16::MAX as usize {
            return Err(PipelineError::InvalidConfig(format!(
                "payload of {payload} bytes overflows the 16-bit length field"
            )));
        }
        if self.threshold_base < 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold base {} must not be negative",
                self.threshold_base
            )));
        }
        Ok(())
    }
}
