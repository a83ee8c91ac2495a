//! End-to-end coverage of the acquisition pipeline: conditioned tone blocks
//! through FFT, magnitude estimation, Mel projection, packetization, and
//! CBC-MAC verification on the receiving side.

use rand::{Rng, SeedableRng};

use sensewave_core::{
    AcquisitionController, AcquisitionPolicy, Authenticator, CipherBackend, ControllerState,
    MagnitudeMode, MelFilterBank, PacketDecoder, PipelineConfig, PipelineError, RadioLink, Result,
    SampleSource, SpectrogramEngine, ThresholdMode, COLLECT_UNBOUNDED,
};

const SAMPLES: usize = 512;
const MELS: usize = 20;
const RATE: u32 = 10_240;

/// A 12-bit ADC block carrying a cosine at an exact FFT bin. The cosine
/// phase keeps the tone's energy on the real spectrum axis, which even the
/// sign-blind magnitude approximations preserve.
fn tone_block(bin: usize, amp: f64) -> Vec<u16> {
    (0..SAMPLES)
        .map(|i| {
            let s = 2048.0
                + amp * (2.0 * std::f64::consts::PI * bin as f64 * i as f64 / SAMPLES as f64).cos();
            s.round() as u16
        })
        .collect()
}

fn engine(mode: MagnitudeMode) -> SpectrogramEngine {
    let bank = MelFilterBank::mel(MELS, SAMPLES, RATE).unwrap();
    SpectrogramEngine::new(SAMPLES, mode, bank).unwrap()
}

fn feature_vector(mode: MagnitudeMode, block: &[u16]) -> Vec<i16> {
    let mut eng = engine(mode);
    let mut samples: Vec<i16> = block.iter().map(|&s| s as i16).collect();
    let mut out = vec![0i16; MELS];
    eng.format(&mut samples);
    eng.compute(&samples, &mut out);
    out
}

#[test]
fn tone_dominates_the_covering_mel_filter_in_every_mode() {
    let bank = MelFilterBank::mel(MELS, SAMPLES, RATE).unwrap();
    for mode in [
        MagnitudeMode::Exact,
        MagnitudeMode::AbsMax,
        MagnitudeMode::AbsSum,
        MagnitudeMode::PureMax,
        MagnitudeMode::PureSum,
    ] {
        for target_bin in [24usize, 60, 120, 200] {
            let out = feature_vector(mode, &tone_block(target_bin, 1900.0));
            let argmax = (0..out.len()).max_by_key(|&i| out[i]).expect("empty vector");
            assert!(
                bank.triangles()[argmax].covers(target_bin),
                "{mode:?}: filter {argmax} does not cover bin {target_bin}: {out:?}"
            );
        }
    }
}

#[test]
fn any_block_yields_a_full_length_q15_vector() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
    for mode in [
        MagnitudeMode::Exact,
        MagnitudeMode::AbsMax,
        MagnitudeMode::AbsSum,
        MagnitudeMode::PureMax,
        MagnitudeMode::PureSum,
    ] {
        let mut eng = engine(mode);
        for _ in 0..8 {
            let mut samples: Vec<i16> = (0..SAMPLES).map(|_| rng.gen_range(0..4096)).collect();
            let mut out = vec![0i16; MELS];
            eng.format(&mut samples);
            eng.compute(&samples, &mut out);
            assert_eq!(out.len(), MELS);
            // Magnitudes and filter weights are non-negative, so a negative
            // coefficient can only come from accumulator wraparound.
            assert!(out.iter().all(|&c| c >= 0), "{mode:?}: {out:?}");
        }
    }
}

struct LoopSource;

impl SampleSource for LoopSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }
    fn stop(&mut self) {}
}

struct CaptureRadio {
    packets: std::rc::Rc<std::cell::RefCell<Vec<Vec<u8>>>>,
}

impl RadioLink for CaptureRadio {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.packets.borrow_mut().push(packet.to_vec());
        Ok(())
    }
}

#[test]
fn node_packets_verify_on_the_host_with_either_backend() {
    let key: [u8; 16] = *b"sensewave-key-01";
    let config = PipelineConfig {
        samples_per_vector: SAMPLES,
        vectors_per_packet: 3,
        mel_vector_length: MELS,
        cipher_backend: CipherBackend::Software,
        cipher_key: key,
        acquisition_policy: AcquisitionPolicy::Overlap,
        ..PipelineConfig::default()
    };
    let packets = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut controller = AcquisitionController::new(
        &config,
        LoopSource,
        CaptureRadio {
            packets: packets.clone(),
        },
    )
    .unwrap();

    controller.start(COLLECT_UNBOUNDED).unwrap();
    for event in 0..6 {
        let slot = event % 2;
        let block = tone_block(60 + event, 1500.0);
        controller.dma_slot_mut(slot).copy_from_slice(&block);
        controller.on_half_buffer_ready(slot).unwrap();
    }
    assert_eq!(controller.state(), ControllerState::Running);

    let packets = packets.borrow();
    assert_eq!(packets.len(), 2, "six vectors at three per packet");

    // The node tagged with the software backend; the host verifies with the
    // hardware-style CBC engine. Identical tags are the contract.
    let max_len = packets[0].len();
    let mut host_auth = Authenticator::new(CipherBackend::Hardware, key, max_len).unwrap();
    for (n, packet) in packets.iter().enumerate() {
        let parsed = PacketDecoder::verify(packet, &mut host_auth).expect("tag must verify");
        assert_eq!(parsed.sender_id, 0x01);
        assert_eq!(parsed.serial, n as u32);
        assert_eq!(parsed.coefficients.len(), 3 * MELS);
    }

    // A flipped payload byte must break verification.
    let mut tampered = packets[0].clone();
    tampered[10] ^= 0x40;
    assert!(matches!(
        PacketDecoder::verify(&tampered, &mut host_auth),
        Err(PipelineError::TagMismatch)
    ));
}

#[test]
fn gated_pipeline_only_transmits_loud_sets() {
    let config = PipelineConfig {
        samples_per_vector: SAMPLES,
        vectors_per_packet: 2,
        mel_vector_length: MELS,
        threshold_mode: ThresholdMode::PerVectorMax,
        threshold_base: 400,
        ..PipelineConfig::default()
    };
    let packets = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut controller = AcquisitionController::new(
        &config,
        LoopSource,
        CaptureRadio {
            packets: packets.clone(),
        },
    )
    .unwrap();
    controller.start(COLLECT_UNBOUNDED).unwrap();

    // Quiet set: mid-scale silence in both halves.
    for slot in [0, 1] {
        controller.dma_slot_mut(slot).fill(2048);
        controller.on_half_buffer_ready(slot).unwrap();
    }
    assert_eq!(packets.borrow().len(), 0, "silence must be gated out");

    // Loud set: a strong tone clears the gate.
    for slot in [0, 1] {
        let block = tone_block(80, 1900.0);
        controller.dma_slot_mut(slot).copy_from_slice(&block);
        controller.on_half_buffer_ready(slot).unwrap();
    }
    assert_eq!(packets.borrow().len(), 1);
}
