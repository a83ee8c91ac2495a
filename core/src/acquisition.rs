//! Interrupt-driven acquisition control: double-buffered sampling, feature
//! extraction, significance gating, and packet emission.
//!
//! The handler runs in a single interrupt context; the only concurrency
//! invariant is that a buffer half being refilled by the transfer engine is
//! never the half being read. The ready flags plus the slot-alternation
//! guard enforce it: a half that completes while the previous half is still
//! held, or that completes twice in a row, means the processing chain fell
//! behind the sampler and the data is gone. That is a fatal overrun, not a
//! degraded mode.

use log::{debug, error, warn};

use crate::auth::Authenticator;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features::FeatureSet;
use crate::fixed::Q15;
use crate::mel::MelFilterBank;
use crate::packet::{hex_encode, PacketEncoder, PACKET_HEADER_LENGTH};
use crate::spectrogram::SpectrogramEngine;
use crate::threshold::ThresholdGate;

/// What happens once a feature set completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionPolicy {
    /// Halt sampling; a new cycle needs an explicit `start`.
    StopStart,
    /// Keep sampling without interruption; the next set begins filling
    /// while the previous packet is handed to the radio.
    Overlap,
}

/// Run acquisition until the budget is spent, or indefinitely.
pub const COLLECT_UNBOUNDED: i32 = -1;

/// The dual-buffer sampling peripheral, as seen from the controller.
pub trait SampleSource {
    /// Arm the continuous transfer into the double buffer.
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
}

/// The radio transceiver handoff. `wake` and `standby` bracket `send` for
/// transceivers with a low-power state; both default to no-ops.
pub trait RadioLink {
    fn wake(&mut self) {}
    fn send(&mut self, packet: &[u8]) -> Result<()>;
    fn standby(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    /// A fatal error stopped the pipeline; only observation is possible.
    Faulted,
}

pub struct AcquisitionController<S: SampleSource, R: RadioLink> {
    source: S,
    radio: R,
    engine: SpectrogramEngine,
    gate: ThresholdGate,
    auth: Authenticator,
    policy: AcquisitionPolicy,
    sender_id: u8,

    /// The two DMA slots, each one raw sample block.
    slots: [Vec<u16>; 2],
    /// Slot currently held for processing.
    slot_ready: [bool; 2],
    /// Completion events must alternate halves; a repeat means the sampler
    /// lapped the processing chain.
    last_slot: Option<usize>,
    /// Private copy the engine works on while the slot refills.
    working: Vec<Q15>,

    set: FeatureSet,
    /// Vectors left to collect, or [`COLLECT_UNBOUNDED`].
    remaining: i32,
    serial: u32,
    state: ControllerState,
}

impl<S: SampleSource, R: RadioLink> AcquisitionController<S, R> {
    pub fn new(config: &PipelineConfig, source: S, radio: R) -> Result<Self> {
        config.validate()?;
        let bank = MelFilterBank::mel(
            config.mel_vector_length,
            config.samples_per_vector,
            config.sample_rate_hz,
        )?;
        let engine = SpectrogramEngine::new(config.samples_per_vector, config.magnitude_mode, bank)?;
        let max_message = PACKET_HEADER_LENGTH
            + 2 * config.vectors_per_packet * config.mel_vector_length;
        Ok(Self {
            source,
            radio,
            engine,
            gate: ThresholdGate::new(config.threshold_mode, config.threshold_base),
            auth: Authenticator::new(config.cipher_backend, config.cipher_key, max_message)?,
            policy: config.acquisition_policy,
            sender_id: config.sender_id,
            slots: [
                vec![0; config.samples_per_vector],
                vec![0; config.samples_per_vector],
            ],
            slot_ready: [false, false],
            last_slot: None,
            working: vec![0; config.samples_per_vector],
            set: FeatureSet::new(config.vectors_per_packet, config.mel_vector_length),
            remaining: 0,
            serial: 0,
            state: ControllerState::Idle,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Serial of the next packet to be transmitted.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// True once the configured vector budget is spent.
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Begin continuous sampling, budgeted to `total_vectors` half-buffer
    /// completions ([`COLLECT_UNBOUNDED`] for no budget). A budget of zero
    /// arms nothing and succeeds.
    pub fn start(&mut self, total_vectors: i32) -> Result<()> {
        if self.state == ControllerState::Faulted {
            return Err(PipelineError::Halted);
        }
        self.remaining = total_vectors;
        self.set.reset();
        self.slot_ready = [false, false];
        self.last_slot = None;
        if total_vectors == 0 {
            return Ok(());
        }
        self.source.start()?;
        self.state = ControllerState::Running;
        Ok(())
    }

    /// Halt sampling without touching the accumulated state.
    pub fn stop(&mut self) {
        self.source.stop();
        if self.state == ControllerState::Running {
            self.state = ControllerState::Idle;
        }
    }

    /// The transfer engine's write window for a slot. Exclusive access here
    /// and in the event handler is what keeps the fill and the read apart.
    pub fn dma_slot_mut(&mut self, slot: usize) -> &mut [u16] {
        &mut self.slots[slot]
    }

    /// Half-buffer completion event, `slot` in {0, 1}. Any error faults the
    /// controller and halts sampling.
    pub fn on_half_buffer_ready(&mut self, slot: usize) -> Result<()> {
        assert!(slot < 2, "slot index {slot} out of range");
        match self.state {
            ControllerState::Faulted => return Err(PipelineError::Halted),
            ControllerState::Idle => {
                warn!("half-buffer event for slot {slot} while idle, ignoring");
                return Ok(());
            }
            ControllerState::Running => {}
        }
        match self.handle_event(slot) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("fatal acquisition error: {e}");
                self.source.stop();
                self.state = ControllerState::Faulted;
                Err(e)
            }
        }
    }

    fn handle_event(&mut self, slot: usize) -> Result<()> {
        if self.slot_ready[1 - slot] || self.last_slot == Some(slot) {
            return Err(PipelineError::Overrun(slot));
        }
        self.last_slot = Some(slot);
        if self.remaining != COLLECT_UNBOUNDED {
            self.remaining -= 1;
        }

        self.slot_ready[slot] = true;
        for (dst, &src) in self.working.iter_mut().zip(&self.slots[slot]) {
            *dst = src as Q15;
        }
        self.engine.format(&mut self.working);
        self.engine.compute(&self.working, self.set.next_vector_mut());
        self.set.advance();
        self.slot_ready[slot] = false;

        if self.set.is_full() {
            self.complete_set()?;
        }
        if self.remaining == 0 && self.state == ControllerState::Running {
            self.source.stop();
            self.state = ControllerState::Idle;
        }
        Ok(())
    }

    /// One feature set is complete: gate it, emit if significant, then apply
    /// the acquisition policy.
    fn complete_set(&mut self) -> Result<()> {
        if self.gate.is_significant(&self.set) {
            self.emit_packet()?;
        } else {
            debug!("threshold not reached, skipping packet");
        }
        match self.policy {
            AcquisitionPolicy::StopStart => {
                self.source.stop();
                self.state = ControllerState::Idle;
            }
            AcquisitionPolicy::Overlap => self.set.reset(),
        }
        Ok(())
    }

    fn emit_packet(&mut self) -> Result<()> {
        let mut packet = PacketEncoder::encode(&self.set, self.sender_id, self.serial)?;
        PacketEncoder::seal(&mut packet, &mut self.auth)?;

        self.radio.wake();
        self.radio.send(&packet)?;
        self.radio.standby();
        debug!("DF:HEX:{}", hex_encode(&packet));

        self.serial = self.serial.wrapping_add(1);
        if self.serial == 0 {
            // The protocol reads serial as a replay/ordering guarantee; a
            // wrapped counter is indistinguishable from a restart.
            return Err(PipelineError::SerialWraparound);
        }
        Ok(())
    }
}
