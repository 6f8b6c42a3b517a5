//! Rep-progression state machine.
//!
//! Consumes one velocity pair per cycle and classifies the lift:
//! `Racked → Descending → ChestStopped → Ascending → Racked` on a good rep,
//! with two escape edges into `Spotting` (rep timer expiry from any moving
//! phase, or the bar sinking back down during ascent). `Spotting` latches the
//! spot request and waits for the winch's acknowledgment; `SpotDone` is
//! terminal until the operator resets the slack.
//!
//! Comparisons against exactly 0.0 are deliberate: the estimator's dead-band
//! already snaps a stationary integrator to 0, so equality is the "bar not
//! moving" signal here.

use crate::SpotterCfg;
use crate::channel::Mailbox;

/// Phase of the ongoing lift. Exactly one value is active at a time; the
/// state machine's `step` is the sole mutation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepPhase {
    Racked,
    Descending,
    ChestStopped,
    Ascending,
    Spotting,
    SpotDone,
}

impl RepPhase {
    pub fn name(self) -> &'static str {
        match self {
            RepPhase::Racked => "racked",
            RepPhase::Descending => "descending",
            RepPhase::ChestStopped => "chest-stopped",
            RepPhase::Ascending => "ascending",
            RepPhase::Spotting => "spotting",
            RepPhase::SpotDone => "spot-done",
        }
    }
}

pub struct SpotMachine {
    cfg: SpotterCfg,
    phase: RepPhase,
    /// Cycles since entering `Descending`; compared against `max_rep_cycles`.
    timer: u32,
    reps: u32,
    spot_request: Mailbox<bool>,
    spot_complete: Mailbox<bool>,
    send_data: Mailbox<bool>,
    done_logged: bool,
}

impl SpotMachine {
    pub fn new(
        cfg: SpotterCfg,
        spot_request: Mailbox<bool>,
        spot_complete: Mailbox<bool>,
        send_data: Mailbox<bool>,
    ) -> Self {
        Self {
            cfg,
            phase: RepPhase::Racked,
            timer: 0,
            reps: 0,
            spot_request,
            spot_complete,
            send_data,
            done_logged: false,
        }
    }

    pub fn phase(&self) -> RepPhase {
        self.phase
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn rep_timer(&self) -> u32 {
        self.timer
    }

    /// Whether the machine still drains the velocity stream. False only in
    /// `SpotDone`; the estimator keeps producing and the queue's drop-oldest
    /// policy absorbs the backlog.
    pub fn wants_sample(&self) -> bool {
        self.phase != RepPhase::SpotDone
    }

    /// Advance one cycle with a fresh velocity pair.
    pub fn step(&mut self, right: f32, left: f32) {
        use RepPhase::*;
        match self.phase {
            Racked => {
                self.timer = 0;
                if right < 0.0 && left < 0.0 {
                    self.transition(Descending);
                }
            }
            Descending => {
                self.timer += 1;
                if self.timed_out() {
                    self.begin_spot();
                } else if right == 0.0 && left == 0.0 {
                    self.transition(ChestStopped);
                }
            }
            ChestStopped => {
                self.timer += 1;
                if self.timed_out() {
                    self.begin_spot();
                } else if right > 0.0 && left > 0.0 {
                    self.transition(Ascending);
                }
            }
            Ascending => {
                self.timer += 1;
                if self.timed_out() {
                    self.begin_spot();
                } else if right < self.cfg.sink_threshold_mps && left < self.cfg.sink_threshold_mps
                {
                    // Bar sinking back down: failed rep.
                    self.begin_spot();
                } else if right == 0.0 && left == 0.0 {
                    self.reps += 1;
                    self.send_data.put(true);
                    tracing::info!(reps = self.reps, "rep completed, bar re-racked");
                    self.transition(Racked);
                }
            }
            Spotting | SpotDone => self.step_idle(),
        }
    }

    /// Advance one cycle without a velocity pair. Motion phases hold their
    /// state (the rep timer counts consumed samples, matching the blocking
    /// cadence of the velocity stream); `Spotting` keeps latching and polling
    /// regardless of the stream.
    pub fn step_idle(&mut self) {
        use RepPhase::*;
        match self.phase {
            Spotting => {
                // Poll the acknowledgment before re-latching: the winch
                // clears the request when it finishes, and latching first
                // would hand it one spurious drive cycle after the ack.
                if self.spot_complete.get() {
                    self.transition(SpotDone);
                } else {
                    self.spot_request.put(true);
                    self.send_data.put(true);
                }
            }
            SpotDone => {
                if !self.done_logged {
                    tracing::info!("spot finished, reset the slack before the next set");
                    self.done_logged = true;
                }
            }
            _ => {}
        }
    }

    fn timed_out(&self) -> bool {
        self.timer >= self.cfg.max_rep_cycles
    }

    fn begin_spot(&mut self) {
        tracing::warn!(timer = self.timer, from = self.phase.name(), "rep failed, spotting initiated");
        self.transition(RepPhase::Spotting);
        // Latch immediately; the winch may poll before our next cycle.
        self.spot_request.put(true);
        self.send_data.put(true);
    }

    fn transition(&mut self, next: RepPhase) {
        tracing::info!(from = self.phase.name(), to = next.name(), timer = self.timer, "phase");
        self.phase = next;
    }
}
