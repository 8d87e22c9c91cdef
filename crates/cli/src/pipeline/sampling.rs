//! Per-sample state of the run loop.
//!
//! Owns the step engine and the "latest reading" registers that ride along
//! in every [`TelemetryFrame`]. Kept free of channels and timers so the
//! snapshot cadence can be tested synchronously.

use contracts::{
    ticks_diff, ControlCommand, DetectorKind, DeviceBlueprint, SamplePacket, TelemetryFrame,
    TickMs, Vec3,
};
use step_engine::{EngineStats, StepEngine};
use tracing::debug;

/// What happened to one packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Reading was not finite; nothing was fed to the engine
    Fault,
    /// Fed to the engine; carries a frame when the snapshot interval elapsed
    Processed {
        stepped: bool,
        frame: Option<TelemetryFrame>,
    },
}

/// 采样循环状态
pub struct SamplingLoop {
    engine: StepEngine,
    snapshot_interval_ms: u32,
    temperature_every: u32,
    temperature_countdown: u32,
    temp_c: Option<f32>,
    accel: Option<Vec3>,
    gyro: Option<Vec3>,
    last_send: Option<TickMs>,
    last_tick: Option<TickMs>,
    next_seq: u64,
}

impl SamplingLoop {
    pub fn new(blueprint: &DeviceBlueprint, kind: DetectorKind) -> Self {
        Self {
            engine: StepEngine::new(kind, blueprint.to_step_config()),
            snapshot_interval_ms: blueprint.sampling.snapshot_interval_ms,
            temperature_every: blueprint.sampling.temperature_every.max(1),
            temperature_countdown: 0,
            temp_c: None,
            accel: None,
            gyro: None,
            last_send: None,
            last_tick: None,
            next_seq: 0,
        }
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Feed one packet.
    ///
    /// The snapshot clock starts at the first processed sample, so the
    /// first frame goes out one full interval later.
    pub fn on_sample(&mut self, packet: &SamplePacket) -> SampleOutcome {
        let sample = &packet.sample;
        let now = packet.timestamp_ms;
        let Some(stepped) = self.engine.try_process(sample, now) else {
            return SampleOutcome::Fault;
        };
        if stepped {
            debug!(
                now_ms = now,
                steps = self.engine.detector().step_count(),
                "step"
            );
        }

        self.accel = Some(sample.accel);
        if sample.gyro.is_some() {
            self.gyro = sample.gyro;
        }
        if self.temperature_countdown == 0 {
            if sample.temp_c.is_some() {
                self.temp_c = sample.temp_c;
            }
            self.temperature_countdown = self.temperature_every;
        }
        self.temperature_countdown -= 1;
        self.last_tick = Some(now);

        let last_send = *self.last_send.get_or_insert(now);
        let frame = if ticks_diff(now, last_send) >= self.snapshot_interval_ms as i32 {
            self.last_send = Some(now);
            Some(self.frame_at(now))
        } else {
            None
        };

        SampleOutcome::Processed { stepped, frame }
    }

    /// Apply a command from a listener
    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Reset => self.engine.reset(),
        }
    }

    /// Frame for the last processed tick, if any sample was seen
    pub fn final_frame(&mut self) -> Option<TelemetryFrame> {
        let tick = self.last_tick?;
        Some(self.frame_at(tick))
    }

    fn frame_at(&mut self, tick: TickMs) -> TelemetryFrame {
        self.next_seq += 1;
        TelemetryFrame {
            seq: self.next_seq,
            timestamp_ms: tick,
            metrics: self.engine.snapshot(),
            temp_c: self.temp_c,
            accel: self.accel,
            gyro: self.gyro,
        }
    }
}
