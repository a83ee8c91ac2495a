//! Acquisition-to-radio pipeline for a battery-powered acoustic sensor node
//!
//! Samples an analog signal through a double-buffered transfer engine,
//! extracts Q15 Mel-spectral feature vectors, gates them for significance,
//! and emits authenticated packets to a radio transceiver.

pub mod acquisition;
pub mod auth;
pub mod config;
pub mod error;
pub mod features;
pub mod fft;
pub mod fixed;
pub mod mel;
pub mod packet;
pub mod spectrogram;
pub mod threshold;

pub use acquisition::{AcquisitionController, AcquisitionPolicy, ControllerState, RadioLink,
    SampleSource, COLLECT_UNBOUNDED};
pub use auth::{Authenticator, CipherBackend, CipherKey, CIPHER_BLOCK_LENGTH};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use features::FeatureSet;
pub use mel::{MelFilterBank, MelTriangle};
pub use packet::{PacketDecoder, PacketEncoder, ParsedPacket, PACKET_HEADER_LENGTH,
    PACKET_TAG_LENGTH};
pub use spectrogram::{MagnitudeMode, SpectrogramEngine};
pub use threshold::{ThresholdGate, ThresholdMode};

// Default pipeline geometry, sized for the reference sensor hardware:
// 512-sample frames at 10.24 kHz are 50 ms of signal per feature vector.
pub const DEFAULT_SAMPLES_PER_VECTOR: usize = 512;
pub const DEFAULT_VECTORS_PER_PACKET: usize = 20;
pub const DEFAULT_MEL_VECTOR_LENGTH: usize = 20;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 10_240;
pub const DEFAULT_SENDER_ID: u8 = 0x01;
