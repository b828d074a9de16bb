//! The simulation controller: owns the equations, the live state, the
//! configuration and the trajectory buffer, and advances them one tick at a
//! time.

use crate::equation_engine::{EquationSet, Expr};
use crate::error::{EngineError, Result};
use crate::presets::Preset;
use crate::solvers::Euler;
use crate::trajectory::{
    BufferMode, OrderedView, TrajectoryBuffer, TrajectorySnapshot, DEFAULT_CAPACITY,
};
use crate::traits::Steppable;
use crate::State;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_DT: f64 = 0.01;
pub const MAX_RENDER_SPEED: u32 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Euler step size. Never zero.
    pub dt: f64,
    /// Integration steps per tick, at least 1.
    pub render_speed: u32,
    pub paused: bool,
    /// Cosmetic, passed through to the renderer.
    pub show_axes: bool,
    /// Cosmetic, passed through to the renderer.
    pub center_cross: bool,
    /// Point the state returns to on reset.
    pub start: [f64; 3],
    pub capacity: usize,
    pub mode: BufferMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_DT,
            render_speed: 1,
            paused: false,
            show_axes: true,
            center_cross: true,
            start: [0.1, 0.1, 0.1],
            capacity: DEFAULT_CAPACITY,
            mode: BufferMode::Ring,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSizeChange {
    Set(f64),
    Scale(f64),
}

/// A partial configuration update. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureOptions {
    pub dt: Option<StepSizeChange>,
    pub render_speed: Option<u32>,
    pub paused: Option<bool>,
    pub show_axes: Option<bool>,
    pub center_cross: Option<bool>,
    /// Takes effect at the next reset.
    pub start: Option<[f64; 3]>,
    /// Switching modes restarts the run.
    pub mode: Option<BufferMode>,
}

/// Discrete user controls, addressed by `name()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    ToggleAxes,
    ToggleCenterCross,
    IncrementSpeed,
    DoubleSpeed,
    DecrementSpeed,
    HalveSpeed,
    HalveStep,
    DoubleStep,
    Reset,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::TogglePause,
        Command::ToggleAxes,
        Command::ToggleCenterCross,
        Command::IncrementSpeed,
        Command::DoubleSpeed,
        Command::DecrementSpeed,
        Command::HalveSpeed,
        Command::HalveStep,
        Command::DoubleStep,
        Command::Reset,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::TogglePause => "toggle_pause",
            Command::ToggleAxes => "toggle_axes",
            Command::ToggleCenterCross => "toggle_center_cross",
            Command::IncrementSpeed => "increment_speed",
            Command::DoubleSpeed => "double_speed",
            Command::DecrementSpeed => "decrement_speed",
            Command::HalveSpeed => "halve_speed",
            Command::HalveStep => "halve_step",
            Command::DoubleStep => "double_step",
            Command::Reset => "reset",
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.name() == s)
            .ok_or_else(|| format!("Unknown command: {s}"))
    }
}

/// Values that had to be clamped while applying a configuration change.
/// Every entry is an `EngineError::DegenerateConfiguration`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigureReport {
    pub adjustments: Vec<EngineError>,
}

impl ConfigureReport {
    pub fn is_clean(&self) -> bool {
        self.adjustments.is_empty()
    }

    fn clamp(&mut self, field: &'static str, requested: f64, applied: f64) {
        self.adjustments.push(EngineError::DegenerateConfiguration {
            field,
            requested,
            applied,
        });
    }
}

/// Where the trajectory first left the finite reals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Divergence {
    pub step: u64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Integration steps taken (0 while paused).
    pub steps: u32,
    /// Steps whose state made it into the buffer.
    pub recorded: u32,
    /// Whether the live state is finite after the tick.
    pub finite: bool,
}

/// Everything a renderer reads in one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub trajectory: TrajectorySnapshot,
    pub state: State,
    pub time: f64,
    pub steps: u64,
    pub config: SimulationConfig,
    pub divergence: Option<Divergence>,
}

pub struct Controller {
    system: EquationSet,
    solver: Euler<f64>,
    state: State,
    t: f64,
    steps: u64,
    config: SimulationConfig,
    buffer: TrajectoryBuffer,
    divergence: Option<Divergence>,
}

/// Binds three parsed equations and builds a controller around them.
pub fn initialize(
    equations: &[Expr; 3],
    start: State,
    buffer_capacity: usize,
    dt: f64,
) -> Result<Controller> {
    let system = EquationSet::compile(equations)?;
    let config = SimulationConfig {
        dt,
        start: start.into(),
        capacity: buffer_capacity,
        ..SimulationConfig::default()
    };
    Controller::new(system, config)
}

impl Controller {
    /// Fails only if the buffer capacity is zero. A zero or non-finite `dt`
    /// falls back to `DEFAULT_DT` and a zero `render_speed` to 1.
    pub fn new(system: EquationSet, mut config: SimulationConfig) -> Result<Self> {
        let buffer = TrajectoryBuffer::new(config.capacity, config.mode)?;
        if config.dt == 0.0 || !config.dt.is_finite() {
            config.dt = DEFAULT_DT;
        }
        config.render_speed = config.render_speed.clamp(1, MAX_RENDER_SPEED);

        Ok(Self {
            system,
            solver: Euler::new(3),
            state: State::from(config.start),
            t: 0.0,
            steps: 0,
            config,
            buffer,
            divergence: None,
        })
    }

    pub fn from_sources(sources: [&str; 3], config: SimulationConfig) -> Result<Self> {
        Self::new(EquationSet::parse(sources)?, config)
    }

    pub fn from_preset(preset: Preset, config: SimulationConfig) -> Result<Self> {
        let config = SimulationConfig {
            start: preset.start().into(),
            ..config
        };
        Self::new(preset.equations()?, config)
    }

    /// Runs `render_speed` Euler steps unless paused, recording each new
    /// state.
    pub fn tick(&mut self) -> TickReport {
        if self.config.paused {
            return TickReport {
                steps: 0,
                recorded: 0,
                finite: is_finite(&self.state),
            };
        }

        let mut recorded = 0;
        for _ in 0..self.config.render_speed {
            self.solver.step(
                &self.system,
                &mut self.t,
                self.state.as_mut_slice(),
                self.config.dt,
            );
            self.steps += 1;
            if self.buffer.push(self.state) {
                recorded += 1;
            }
            if self.divergence.is_none() && !is_finite(&self.state) {
                self.divergence = Some(Divergence {
                    step: self.steps,
                    time: self.t,
                });
            }
        }

        TickReport {
            steps: self.config.render_speed,
            recorded,
            finite: is_finite(&self.state),
        }
    }

    /// Clears the trail and returns the state to the configured start.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::from(self.config.start);
        self.t = 0.0;
        self.steps = 0;
        self.divergence = None;
    }

    /// Installs a new equation set and resets. On error the previous set
    /// stays installed and nothing is touched.
    pub fn set_equations(&mut self, equations: &[Expr; 3]) -> Result<()> {
        self.set_system(EquationSet::compile(equations)?);
        Ok(())
    }

    pub fn set_equation_sources(&mut self, sources: [&str; 3]) -> Result<()> {
        self.set_system(EquationSet::parse(sources)?);
        Ok(())
    }

    /// Installs an already compiled equation set and resets.
    pub fn set_system(&mut self, system: EquationSet) {
        self.system = system;
        self.reset();
    }

    pub fn configure(&mut self, options: ConfigureOptions) -> ConfigureReport {
        let mut report = ConfigureReport::default();

        match options.dt {
            Some(StepSizeChange::Set(dt)) => self.set_dt(dt, &mut report),
            Some(StepSizeChange::Scale(factor)) => self.scale_dt(factor, &mut report),
            None => {}
        }
        if let Some(speed) = options.render_speed {
            self.set_render_speed(speed, &mut report);
        }
        if let Some(paused) = options.paused {
            self.config.paused = paused;
        }
        if let Some(show_axes) = options.show_axes {
            self.config.show_axes = show_axes;
        }
        if let Some(center_cross) = options.center_cross {
            self.config.center_cross = center_cross;
        }
        if let Some(start) = options.start {
            self.config.start = start;
        }
        if let Some(mode) = options.mode {
            if mode != self.config.mode {
                self.config.mode = mode;
                self.buffer.set_mode(mode);
                self.reset();
            }
        }

        report
    }

    pub fn apply(&mut self, command: Command) -> ConfigureReport {
        let mut report = ConfigureReport::default();
        let speed = self.config.render_speed;

        match command {
            Command::TogglePause => self.config.paused = !self.config.paused,
            Command::ToggleAxes => self.config.show_axes = !self.config.show_axes,
            Command::ToggleCenterCross => self.config.center_cross = !self.config.center_cross,
            Command::IncrementSpeed => self.set_render_speed(speed.saturating_add(1), &mut report),
            Command::DoubleSpeed => self.set_render_speed(speed.saturating_mul(2), &mut report),
            Command::DecrementSpeed => self.set_render_speed(speed.saturating_sub(1), &mut report),
            Command::HalveSpeed => self.set_render_speed(speed / 2, &mut report),
            Command::HalveStep => self.scale_dt(0.5, &mut report),
            Command::DoubleStep => self.scale_dt(2.0, &mut report),
            Command::Reset => self.reset(),
        }

        report
    }

    // A requested step that is zero or non-finite is refused outright.
    fn set_dt(&mut self, dt: f64, report: &mut ConfigureReport) {
        if dt == 0.0 || !dt.is_finite() {
            report.clamp("dt", dt, self.config.dt);
            return;
        }
        self.config.dt = dt;
    }

    // Underflow to zero restores the default, overflow keeps the prior step.
    fn scale_dt(&mut self, factor: f64, report: &mut ConfigureReport) {
        let scaled = self.config.dt * factor;
        if scaled == 0.0 {
            report.clamp("dt", scaled, DEFAULT_DT);
            self.config.dt = DEFAULT_DT;
        } else if !scaled.is_finite() {
            report.clamp("dt", scaled, self.config.dt);
        } else {
            self.config.dt = scaled;
        }
    }

    fn set_render_speed(&mut self, speed: u32, report: &mut ConfigureReport) {
        let applied = speed.clamp(1, MAX_RENDER_SPEED);
        if applied != speed {
            report.clamp("render_speed", f64::from(speed), f64::from(applied));
        }
        self.config.render_speed = applied;
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn equations(&self) -> &EquationSet {
        &self.system
    }

    pub fn divergence(&self) -> Option<Divergence> {
        self.divergence
    }

    pub fn buffer(&self) -> &TrajectoryBuffer {
        &self.buffer
    }

    pub fn ordered_view(&self) -> OrderedView<'_> {
        self.buffer.ordered_view()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            trajectory: self.buffer.snapshot(),
            state: self.state,
            time: self.t,
            steps: self.steps,
            config: self.config.clone(),
            divergence: self.divergence,
        }
    }
}

fn is_finite(state: &State) -> bool {
    state.iter().all(|v| v.is_finite())
}
