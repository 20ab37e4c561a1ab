//! The streaming engine facade.
//!
//! [`DbdmaAudioEngine`] owns the platform seam and wires the ring buffers,
//! descriptor chains, channel controller, conversion selector, processing
//! banks and auxiliary synchronizer together. Execution happens in three
//! host-supplied contexts:
//!
//! | Context | Entry points | May touch |
//! |---------|-------------|-----------|
//! | interrupt | [`EngineEvents::on_interrupt`] | atomics, channel status |
//! | real-time callback | [`process_output_block`](DbdmaAudioEngine::process_output_block), [`read_input_block`](DbdmaAudioEngine::read_input_block) | ring, snapshots, aux sync |
//! | control | everything else | allocation, rebuilds, swaps |
//!
//! No blocking primitive mediates between the real-time and control
//! contexts: coefficient hand-off goes through double buffers, the routine
//! reference through one atomic, and the real-time path only ever
//! `try_lock`s the stream and aux slots (contention is impossible during
//! normal operation because rebuilds and attach/detach run while the host
//! guarantees the callback quiescent; if it ever happens anyway the
//! callback skips once rather than block).

use alloc::sync::Arc;
use alloc::vec::Vec;

use core::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use spin::Mutex;

#[cfg(feature = "aux-sync")]
use alloc::boxed::Box;

#[cfg(feature = "aux-sync")]
use crate::aux_sync::{AuxSync, AuxSyncConfig};
use crate::coeffs::{
    BiquadCoeffs, CrossoverState, EqState, LimiterState, ProcessingBanks, ProcessingSnapshot,
};
use crate::convert::{routines, ConvertParams, FixupState, Routine, RoutineInputs, RoutineSelector};
use crate::dbuf::DoubleBuffer;
use crate::diag::{ChannelRegisters, DiagnosticSnapshot};
use crate::dma::controller::{regs, ControllerState, EngineState, Health};
use crate::dma::DescriptorChain;
use crate::error::{Error, Result};
use crate::format::{default_format, default_rate, validate_pair, StreamFormat};
#[cfg(feature = "aux-sync")]
use crate::platform::AuxTransport;
use crate::platform::{CoefficientSink, Direction, DmaMemory, Platform};
use crate::ring::RingBuffer;

/// Engine construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Ring blocks per direction.
    pub block_count: usize,
    /// Bytes per block (one real-time callback's worth).
    pub block_bytes: usize,
    /// Whether to drive the capture channel as well.
    pub with_input: bool,
}

/// Parameters of one format activation.
#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    pub block_count: usize,
    pub block_bytes: usize,
    pub sample_rate: u32,
    pub format: StreamFormat,
    /// Capture-side format; may diverge from the output sample format but
    /// must share its bit width.
    pub input_format: Option<StreamFormat>,
}

/// Which channel fixups are requested by the control surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixupFlags {
    pub delay: bool,
    pub mix: bool,
    pub balance: bool,
    pub invert: bool,
}

/// Ring, chain and per-stream real-time state, rebuilt as a unit on every
/// format activation and discarded as a unit on the next.
struct ActiveStream<M: DmaMemory> {
    format: StreamFormat,
    sample_rate: u32,
    output_ring: RingBuffer<M>,
    output_chain: DescriptorChain<M>,
    input: Option<(RingBuffer<M>, DescriptorChain<M>)>,
    fixup_state: FixupState,
    aux_feed: Vec<f32>,
}

struct Shared<P: Platform> {
    platform: P,
    controller: ControllerState,
    selector: RoutineSelector,
    banks: ProcessingBanks,
    params: DoubleBuffer<ConvertParams>,
    fixups: Mutex<FixupFlags>,
    format: Mutex<StreamFormat>,
    stream: Mutex<Option<ActiveStream<P::Memory>>>,
    input_present: AtomicBool,
    #[cfg(feature = "aux-sync")]
    aux: Mutex<Option<AuxSync>>,
    #[cfg(feature = "aux-sync")]
    aux_attached: AtomicBool,
    #[cfg(feature = "aux-sync")]
    aux_attach_pending: AtomicBool,
}

impl<P: Platform> Shared<P> {
    fn aux_attached(&self) -> bool {
        #[cfg(feature = "aux-sync")]
        {
            self.aux_attached.load(Ordering::Acquire)
        }
        #[cfg(not(feature = "aux-sync"))]
        {
            false
        }
    }

    /// Recompute the active conversion routine from the current inputs.
    fn reselect(&self) {
        let flags = *self.fixups.lock();
        let width = self.format.lock().bit_width;
        self.selector.reselect(RoutineInputs {
            width,
            aux: self.aux_attached(),
            delay: flags.delay,
            mix: flags.mix,
            balance: flags.balance,
            invert: flags.invert,
        });
    }
}

/// One engine instance per physical device. All synchronization state is
/// per-instance; nothing lives in statics.
pub struct DbdmaAudioEngine<P: Platform> {
    shared: Arc<Shared<P>>,
}

impl<P: Platform> DbdmaAudioEngine<P> {
    /// Create an engine and apply the default format.
    ///
    /// A missing interrupt source or channel address is a fatal
    /// configuration error here; nothing is half-initialized on failure.
    pub fn new(platform: P, config: EngineConfig) -> Result<DbdmaAudioEngine<P>> {
        if !platform.interrupt_source_present() || !platform.has_channel(Direction::Output) {
            return Err(Error::ConfigurationMissing);
        }
        if config.with_input && !platform.has_channel(Direction::Input) {
            return Err(Error::ConfigurationMissing);
        }

        let shared = Arc::new(Shared {
            platform,
            controller: ControllerState::new(),
            selector: RoutineSelector::new(Routine::Out16),
            banks: ProcessingBanks::new(),
            params: DoubleBuffer::new(ConvertParams::default()),
            fixups: Mutex::new(FixupFlags::default()),
            format: Mutex::new(default_format()),
            stream: Mutex::new(None),
            input_present: AtomicBool::new(false),
            #[cfg(feature = "aux-sync")]
            aux: Mutex::new(None),
            #[cfg(feature = "aux-sync")]
            aux_attached: AtomicBool::new(false),
            #[cfg(feature = "aux-sync")]
            aux_attach_pending: AtomicBool::new(false),
        });

        let engine = DbdmaAudioEngine { shared };
        engine.activate_format(StreamConfig {
            block_count: config.block_count,
            block_bytes: config.block_bytes,
            sample_rate: default_rate(),
            format: default_format(),
            input_format: config.with_input.then(default_format),
        })?;
        Ok(engine)
    }

    /// The platform seam, for the surrounding glue.
    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    /// Handle for host interrupt and attach-notification callbacks.
    pub fn events(&self) -> EngineEvents<P> {
        EngineEvents {
            shared: self.shared.clone(),
        }
    }

    /// (Re)build the ring buffer and descriptor chain pair for a format.
    ///
    /// Only legal while administratively stopped; the host framework
    /// guarantees the real-time callback is not invoked in that window.
    /// On any failure the previously active stream stays installed.
    pub fn activate_format(&self, config: StreamConfig) -> Result<()> {
        if self.shared.controller.state() != EngineState::Stopped {
            return Err(Error::NotStopped);
        }
        validate_pair(&config.format, config.input_format.as_ref())?;
        if config.block_bytes % config.format.frame_bytes() != 0 {
            return Err(Error::FormatMismatch);
        }

        let platform = &self.shared.platform;
        let output_ring = RingBuffer::allocate(platform, config.block_count, config.block_bytes)?;
        let output_chain = DescriptorChain::build(platform, &output_ring, Direction::Output)?;
        let input = match config.input_format {
            Some(_) => {
                let ring = RingBuffer::allocate(platform, config.block_count, config.block_bytes)?;
                let chain = DescriptorChain::build(platform, &ring, Direction::Input)?;
                Some((ring, chain))
            }
            None => None,
        };

        // Everything built; the old pair is discarded as a unit here.
        *self.shared.stream.lock() = Some(ActiveStream {
            format: config.format,
            sample_rate: config.sample_rate,
            output_ring,
            output_chain,
            input,
            fixup_state: FixupState::default(),
            aux_feed: Vec::new(),
        });
        *self.shared.format.lock() = config.format;
        self.shared
            .input_present
            .store(config.input_format.is_some(), Ordering::Release);
        self.shared.reselect();
        Ok(())
    }

    /// Start the hardware channels (input before output), resetting
    /// processing and sync state first.
    pub fn start(&self) -> Result<()> {
        if self.shared.controller.is_dead() {
            return Err(Error::EngineDead);
        }
        if self.shared.controller.state() != EngineState::Stopped {
            return Err(Error::NotStopped);
        }

        let (output_head, input_head) = {
            let mut guard = self.shared.stream.lock();
            let stream = guard.as_mut().ok_or(Error::ConfigurationMissing)?;
            stream.fixup_state.reset();
            (
                stream.output_chain.head(),
                stream.input.as_ref().map(|(_, chain)| chain.head()),
            )
        };
        self.shared.banks.reset();
        #[cfg(feature = "aux-sync")]
        if let Some(aux) = self.shared.aux.lock().as_mut() {
            aux.request_resync();
        }

        self.shared
            .controller
            .start(&self.shared.platform, output_head, input_head);
        Ok(())
    }

    /// Stop the hardware channels with a bounded wait for idle, then flush
    /// the rings to silence.
    pub fn stop(&self) {
        let has_input = self.shared.input_present.load(Ordering::Acquire);
        self.shared.controller.stop(&self.shared.platform, has_input);

        let mut guard = self.shared.stream.lock();
        if let Some(stream) = guard.as_mut() {
            stream.output_ring.fill_silence();
            if let Some((ring, _)) = stream.input.as_mut() {
                ring.fill_silence();
            }
        }
    }

    /// Stop-then-start, used on suspected corruption.
    pub fn restart(&self) -> Result<()> {
        self.stop();
        self.start()
    }

    /// Periodic engine health check; call from a non-real-time context.
    ///
    /// Performs the recovery restart itself when the heartbeat stalled.
    /// Returns [`Error::EngineDead`] once recoveries are exhausted.
    pub fn health_check(&self) -> Result<()> {
        match self.shared.controller.health_check() {
            Health::Healthy => Ok(()),
            Health::NeedsRestart => {
                warn!("engine heartbeat stalled, restarting");
                self.restart()
            }
            Health::Dead => Err(Error::EngineDead),
        }
    }

    /// Real-time entry: convert one block of mixer output into the ring
    /// and run one auxiliary synchronization step.
    ///
    /// `mix` holds interleaved stereo `f32` frames for block `block_index`
    /// (indices beyond the ring wrap).
    pub fn process_output_block(&self, mix: &[f32], block_index: usize) {
        let Some(mut guard) = self.shared.stream.try_lock() else {
            return;
        };
        let Some(stream) = guard.as_mut() else {
            return;
        };

        let block_count = stream.output_ring.block_count();
        let block_bytes = stream.output_ring.block_bytes();
        let frames_per_block = (block_bytes / stream.format.frame_bytes()) as u32;
        if mix.len() != frames_per_block as usize * 2 {
            return;
        }

        let block = block_index % block_count;
        let offset = stream.output_ring.block_offset(block);

        let routine = self.shared.selector.active();
        let params = self.shared.params.snapshot();

        let ActiveStream {
            output_ring,
            fixup_state,
            aux_feed,
            ..
        } = stream;
        routines::run(
            routine,
            mix,
            output_ring.bytes_mut(offset, block_bytes),
            &params,
            fixup_state,
            Some(&mut *aux_feed),
        );

        #[cfg(feature = "aux-sync")]
        {
            let ring_frames = frames_per_block * block_count as u32;
            let main_pos = ((block as u32 + 1) * frames_per_block) % ring_frames;
            if let Some(mut aux_guard) = self.shared.aux.try_lock() {
                if let Some(aux) = aux_guard.as_mut() {
                    let feed: &[f32] = if routine.has_aux() { aux_feed.as_slice() } else { &[] };
                    aux.process(feed, main_pos, ring_frames);
                }
            }
        }
    }

    /// Real-time entry: copy one captured block out of the input ring.
    pub fn read_input_block(&self, block_index: usize, dst: &mut [u8]) -> bool {
        let Some(mut guard) = self.shared.stream.try_lock() else {
            return false;
        };
        let Some(stream) = guard.as_mut() else {
            return false;
        };
        let Some((ring, _)) = stream.input.as_mut() else {
            return false;
        };
        let block = block_index % ring.block_count();
        let len = ring.block_bytes().min(dst.len());
        let offset = ring.block_offset(block);
        dst[..len].copy_from_slice(ring.bytes_mut(offset, len));
        true
    }

    /// The conversion routine the real-time path currently runs.
    pub fn active_routine(&self) -> Routine {
        self.shared.selector.active()
    }

    /// Real-time entry: take one coherent snapshot of the EQ, limiter and
    /// crossover state for this callback's DSP stage. Dereference once,
    /// use for the whole call.
    pub fn processing_snapshot(&self) -> ProcessingSnapshot {
        self.shared.banks.rt_snapshot()
    }

    /// Change the requested channel fixups; reselects the routine once.
    pub fn set_fixups(&self, flags: FixupFlags) {
        *self.shared.fixups.lock() = flags;
        self.shared.reselect();
    }

    /// Publish new balance gains for the balance fixup.
    pub fn set_balance(&self, left: f32, right: f32) {
        self.shared.params.publish(ConvertParams {
            balance_left: left,
            balance_right: right,
        });
    }

    pub fn set_eq_band(&self, band: usize, coeffs: BiquadCoeffs) -> Result<()> {
        self.shared.banks.set_eq_band(band, coeffs)
    }

    pub fn set_eq(&self, state: EqState) -> Result<()> {
        self.shared.banks.set_eq(state)
    }

    pub fn set_limiter(&self, state: LimiterState) {
        self.shared.banks.set_limiter(state)
    }

    pub fn set_crossover(&self, state: CrossoverState) -> Result<()> {
        self.shared.banks.set_crossover(state)
    }

    /// Push current coefficient snapshots to a codec or output plugin.
    pub fn push_coefficients<S: CoefficientSink>(&self, sink: &S) {
        self.shared.banks.push_to(sink)
    }

    /// Attach the auxiliary device and begin synchronizing it.
    #[cfg(feature = "aux-sync")]
    pub fn attach_aux(
        &self,
        transport: Box<dyn AuxTransport + Send>,
        target_lead: u32,
    ) -> Result<()> {
        let (main_rate, callback_frames) = {
            let guard = self.shared.stream.lock();
            let stream = guard.as_ref().ok_or(Error::ConfigurationMissing)?;
            (
                stream.sample_rate,
                (stream.output_ring.block_bytes() / stream.format.frame_bytes()) as u32,
            )
        };
        let sync = AuxSync::attach(
            transport,
            AuxSyncConfig {
                main_rate,
                target_lead,
                callback_frames,
            },
        );
        *self.shared.aux.lock() = Some(sync);
        self.shared.aux_attached.store(true, Ordering::Release);
        self.shared.reselect();
        Ok(())
    }

    /// Detach the auxiliary device, tearing its sync state down
    /// immediately.
    #[cfg(feature = "aux-sync")]
    pub fn detach_aux(&self) {
        drop(self.shared.aux.lock().take());
        self.shared.aux_attached.store(false, Ordering::Release);
        self.shared.reselect();
    }

    /// Whether an attach notification arrived and has not been serviced.
    #[cfg(feature = "aux-sync")]
    pub fn take_aux_attach_pending(&self) -> bool {
        self.shared.aux_attach_pending.swap(false, Ordering::AcqRel)
    }

    fn channel_registers(&self, direction: Direction) -> ChannelRegisters {
        let platform = &self.shared.platform;
        ChannelRegisters {
            direction,
            control: platform.read_reg(direction, regs::CHANNEL_CONTROL),
            status: platform.read_reg(direction, regs::CHANNEL_STATUS),
            command_ptr: platform.read_reg(direction, regs::COMMAND_PTR_LO),
            interrupt_select: platform.read_reg(direction, regs::INTERRUPT_SELECT),
            branch_select: platform.read_reg(direction, regs::BRANCH_SELECT),
            wait_select: platform.read_reg(direction, regs::WAIT_SELECT),
        }
    }

    /// Read-only diagnostic copy-out for external tooling.
    pub fn diagnostics(&self) -> DiagnosticSnapshot {
        let controller = &self.shared.controller;
        let (output_descriptors, input_descriptors, sample_rate) = {
            let guard = self.shared.stream.lock();
            match guard.as_ref() {
                Some(stream) => (
                    stream.output_chain.snapshot(),
                    stream.input.as_ref().map(|(_, chain)| chain.snapshot()),
                    stream.sample_rate,
                ),
                None => (Vec::new(), None, default_rate()),
            }
        };

        let mut channels = Vec::new();
        channels.push(self.channel_registers(Direction::Output));
        if self.shared.input_present.load(Ordering::Acquire) {
            channels.push(self.channel_registers(Direction::Input));
        }

        DiagnosticSnapshot {
            state: controller.state(),
            interrupt_count: controller.interrupt_count(),
            frozen_count: controller.frozen_count(),
            recovery_count: controller.recovery_count(),
            engine_dead: controller.is_dead(),
            format: *self.shared.format.lock(),
            sample_rate,
            aux_attached: self.shared.aux_attached(),
            output_descriptors,
            input_descriptors,
            channels,
            eq: self.shared.banks.eq_snapshot(),
            limiter: self.shared.banks.limiter_snapshot(),
            crossover: self.shared.banks.crossover_snapshot(),
        }
    }

    /// Copy bytes out of the output ring, for tests only.
    #[cfg(test)]
    pub(crate) fn peek_output(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut guard = self.shared.stream.lock();
        let stream = guard.as_mut().expect("no active stream");
        stream.output_ring.bytes_mut(offset, len).to_vec()
    }
}

/// Injected hardware-event surface: the platform layer registers with the
/// host's interrupt and attach-notification facilities and forwards the
/// callbacks here.
pub struct EngineEvents<P: Platform> {
    shared: Arc<Shared<P>>,
}

impl<P: Platform> Clone for EngineEvents<P> {
    fn clone(&self) -> Self {
        EngineEvents {
            shared: self.shared.clone(),
        }
    }
}

impl<P: Platform> EngineEvents<P> {
    /// Interrupt-context entry. Counts the heartbeat, inspects both
    /// channels' active bits, and raises (never acts on) the needs-restart
    /// flag. No allocation, no locks, never blocks.
    pub fn on_interrupt(&self) {
        let has_input = self.shared.input_present.load(Ordering::Acquire);
        self.shared
            .controller
            .on_interrupt(&self.shared.platform, has_input);
    }

    /// Auxiliary-device arrival notification (non-interrupt context).
    /// Records the event; the control layer services it by attaching a
    /// transport.
    #[cfg(feature = "aux-sync")]
    pub fn on_aux_attach_notify(&self) {
        self.shared.aux_attach_pending.store(true, Ordering::Release);
    }

    /// Auxiliary-device removal notification (non-interrupt context).
    /// Tears all synchronizer state down immediately.
    #[cfg(feature = "aux-sync")]
    pub fn on_aux_detach_notify(&self) {
        drop(self.shared.aux.lock().take());
        self.shared.aux_attached.store(false, Ordering::Release);
        self.shared.reselect();
    }
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "aux-sync")]
    use alloc::boxed::Box;

    use super::*;
    use crate::constants::FREEZE_CHECKS;
    use crate::dma::controller::ChannelStatus;
    use crate::format::{BitWidth, SampleKind, FORMATS};
    #[cfg(feature = "aux-sync")]
    use crate::testing::MockAuxTransport;
    use crate::testing::{MockPlatform, RecordingSink};

    const CONFIG: EngineConfig = EngineConfig {
        block_count: 4,
        block_bytes: 512,
        with_input: false,
    };

    fn engine() -> DbdmaAudioEngine<MockPlatform> {
        DbdmaAudioEngine::new(MockPlatform::new(), CONFIG).unwrap()
    }

    #[test]
    fn init_applies_the_default_format() {
        let engine = engine();
        let diag = engine.diagnostics();
        assert_eq!(diag.state, EngineState::Stopped);
        assert_eq!(diag.format, default_format());
        assert_eq!(diag.sample_rate, default_rate());
        // 4 data descriptors plus the stop marker.
        assert_eq!(diag.output_descriptors.len(), 5);
        assert!(diag.input_descriptors.is_none());
    }

    #[test]
    fn missing_interrupt_source_is_fatal_at_init() {
        let result = DbdmaAudioEngine::new(MockPlatform::without_interrupt_source(), CONFIG);
        assert!(matches!(result, Err(Error::ConfigurationMissing)));
    }

    #[test]
    fn missing_output_channel_is_fatal_at_init() {
        let result = DbdmaAudioEngine::new(MockPlatform::without_output_channel(), CONFIG);
        assert!(matches!(result, Err(Error::ConfigurationMissing)));
    }

    #[test]
    fn start_and_stop_drive_the_channel() {
        let engine = engine();
        engine.start().unwrap();
        assert_eq!(engine.diagnostics().state, EngineState::Running);
        assert!(engine
            .platform()
            .status(Direction::Output)
            .contains(ChannelStatus::RUN));

        engine.stop();
        assert_eq!(engine.diagnostics().state, EngineState::Stopped);
        assert!(!engine
            .platform()
            .status(Direction::Output)
            .contains(ChannelStatus::RUN));
    }

    #[test]
    fn activation_is_rejected_while_running() {
        let engine = engine();
        engine.start().unwrap();
        let result = engine.activate_format(StreamConfig {
            block_count: 8,
            block_bytes: 512,
            sample_rate: 44_100,
            format: default_format(),
            input_format: None,
        });
        assert_eq!(result, Err(Error::NotStopped));
    }

    #[test]
    fn failed_activation_leaves_the_previous_stream_intact() {
        let engine = engine();
        engine.platform().fail_next_alloc();

        let result = engine.activate_format(StreamConfig {
            block_count: 8,
            block_bytes: 1024,
            sample_rate: 44_100,
            format: default_format(),
            input_format: None,
        });
        assert_eq!(result, Err(Error::AllocationFailure));

        // Prior ring/chain pair still installed and startable.
        assert_eq!(engine.diagnostics().output_descriptors.len(), 5);
        engine.start().unwrap();
    }

    #[test]
    fn mismatched_input_width_is_rejected() {
        let engine = engine();
        let result = engine.activate_format(StreamConfig {
            block_count: 4,
            block_bytes: 512,
            sample_rate: 44_100,
            format: FORMATS[0].format,              // W16
            input_format: Some(FORMATS[1].format),  // W32
        });
        assert_eq!(result, Err(Error::FormatMismatch));
    }

    #[test]
    fn process_block_converts_into_the_ring() {
        let engine = engine();
        engine.start().unwrap();

        // 512-byte blocks of 16-bit stereo: 128 frames.
        let mix = [0.5f32; 256];
        engine.process_output_block(&mix, 0);

        let bytes = engine.peek_output(0, 4);
        assert_eq!(bytes, alloc::vec![0x40, 0x00, 0x40, 0x00]);

        // Block index wraps around the ring.
        engine.process_output_block(&mix, 5);
        let bytes = engine.peek_output(512, 4);
        assert_eq!(bytes, alloc::vec![0x40, 0x00, 0x40, 0x00]);
    }

    #[test]
    fn fixup_changes_reselect_the_routine_once() {
        let engine = engine();
        assert_eq!(engine.active_routine(), Routine::Out16);

        engine.set_fixups(FixupFlags {
            delay: true,
            balance: true,
            ..FixupFlags::default()
        });
        assert_eq!(engine.active_routine(), Routine::Out16DelayBalance);
        assert_eq!(engine.active_routine().width(), BitWidth::W16);
    }

    #[cfg(feature = "aux-sync")]
    #[test]
    fn aux_attach_selects_the_aux_sibling_routine() {
        let engine = engine();
        engine.set_fixups(FixupFlags {
            delay: true,
            balance: true,
            ..FixupFlags::default()
        });

        let transport = MockAuxTransport::new(44_100, 8_820);
        engine.attach_aux(Box::new(transport.clone()), 960).unwrap();
        assert!(transport.is_started());
        assert_eq!(engine.active_routine(), Routine::Out16AuxDelayBalance);
        assert!(engine.diagnostics().aux_attached);

        engine.detach_aux();
        assert!(!transport.is_started());
        assert_eq!(engine.active_routine(), Routine::Out16DelayBalance);
    }

    #[cfg(feature = "aux-sync")]
    #[test]
    fn detach_notification_tears_aux_state_down() {
        let engine = engine();
        let transport = MockAuxTransport::new(44_100, 8_820);
        engine.attach_aux(Box::new(transport.clone()), 960).unwrap();

        engine.events().on_aux_detach_notify();
        assert!(!transport.is_started());
        assert!(!engine.diagnostics().aux_attached);
        assert!(!engine.active_routine().has_aux());
    }

    #[cfg(feature = "aux-sync")]
    #[test]
    fn attach_notification_is_latched_for_the_control_layer() {
        let engine = engine();
        assert!(!engine.take_aux_attach_pending());
        engine.events().on_aux_attach_notify();
        assert!(engine.take_aux_attach_pending());
        assert!(!engine.take_aux_attach_pending());
    }

    #[test]
    fn interrupts_feed_the_heartbeat_counter() {
        let engine = engine();
        engine.start().unwrap();
        let events = engine.events();
        events.on_interrupt();
        events.on_interrupt();
        events.on_interrupt();
        assert_eq!(engine.diagnostics().interrupt_count, 3);
        engine.health_check().unwrap();
        assert_eq!(engine.diagnostics().frozen_count, 0);
    }

    #[test]
    fn stalled_heartbeat_restarts_the_engine() {
        let engine = engine();
        engine.start().unwrap();

        for _ in 0..FREEZE_CHECKS {
            engine.health_check().unwrap();
        }

        let diag = engine.diagnostics();
        assert_eq!(diag.frozen_count, 1);
        // The recovery restart already ran; the engine is running again.
        assert_eq!(diag.state, EngineState::Running);

        let head_writes = engine
            .platform()
            .writes()
            .iter()
            .filter(|w| w.direction == Direction::Output && w.offset == regs::COMMAND_PTR_LO)
            .count();
        assert_eq!(head_writes, 2);
    }

    #[test]
    fn balance_gains_reach_the_conversion_path() {
        let engine = engine();
        engine.start().unwrap();
        engine.set_fixups(FixupFlags {
            balance: true,
            ..FixupFlags::default()
        });
        engine.set_balance(0.5, 1.0);

        let mix = [0.5f32; 256];
        engine.process_output_block(&mix, 0);
        // Left halved (0.25 -> 8192), right untouched (0.5 -> 16384).
        assert_eq!(engine.peek_output(0, 4), alloc::vec![0x20, 0x00, 0x40, 0x00]);
    }

    #[test]
    fn processing_snapshot_is_complete_per_family() {
        let engine = engine();
        engine
            .set_limiter(LimiterState {
                threshold: 0.9,
                attack: 1.5,
                release: 80.0,
                lookahead: 2.0,
                enabled: true,
            });

        let snap = engine.processing_snapshot();
        assert!(snap.limiter.enabled);
        assert_eq!(snap.limiter.threshold, 0.9);
        // The other families still hold their initial instances.
        assert!(!snap.eq.enabled);
        assert_eq!(snap.crossover.point_count, 0);
    }

    #[test]
    fn coefficient_snapshots_reach_the_sink() {
        let engine = engine();
        engine
            .set_eq_band(0, crate::coeffs::BiquadCoeffs::IDENTITY)
            .unwrap();
        assert_eq!(
            engine.set_eq_band(64, crate::coeffs::BiquadCoeffs::IDENTITY),
            Err(Error::InvalidBand(64))
        );

        let sink = RecordingSink::default();
        engine.push_coefficients(&sink);
        assert_eq!(sink.eq_pushes.load(core::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(
            sink.limiter_pushes
                .load(core::sync::atomic::Ordering::Relaxed),
            1
        );
        assert_eq!(
            sink.crossover_pushes
                .load(core::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn capture_stream_builds_and_copies_blocks_out() {
        let engine = DbdmaAudioEngine::new(
            MockPlatform::new(),
            EngineConfig {
                with_input: true,
                ..CONFIG
            },
        )
        .unwrap();

        let diag = engine.diagnostics();
        assert!(diag.input_descriptors.is_some());
        assert_eq!(diag.input_descriptors.unwrap().len(), 5);
        assert_eq!(diag.channels.len(), 2);

        let mut block = [0xFFu8; 512];
        assert!(engine.read_input_block(0, &mut block));
        // Freshly allocated capture ring reads back silence.
        assert!(block.iter().all(|&b| b == 0));
    }

    #[test]
    fn divergent_input_sample_format_with_shared_width_is_accepted() {
        let engine = engine();
        let mut input = default_format();
        input.kind = SampleKind::Float;
        let result = engine.activate_format(StreamConfig {
            block_count: 4,
            block_bytes: 512,
            sample_rate: 44_100,
            format: default_format(),
            input_format: Some(input),
        });
        assert!(result.is_ok());
        assert!(engine.diagnostics().input_descriptors.is_some());
    }
}
