//! Controller wrapper driven by the browser render loop.
//!
//! The host calls `tick` once per animation frame, then takes a `frame`,
//! uploads its `positions` and `colors` into vertex buffers and draws one line
//! strip per entry of `segment_lengths`.

use anyhow::{anyhow, Context, Result};
use attractor_core::equation_engine::EquationSet;
use attractor_core::presets::Preset;
use attractor_core::simulation::{
    Command, ConfigureOptions, ConfigureReport, Controller, SimulationConfig,
};
use attractor_core::trajectory::BufferMode;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSimulation {
    pub(crate) controller: Controller,
}

/// Render data for one frame, gathered in a single pass over the trail.
#[wasm_bindgen]
pub struct Frame {
    positions: Vec<f64>,
    colors: Vec<f32>,
    segment_lengths: Vec<u32>,
}

#[wasm_bindgen]
impl Frame {
    /// Recorded points oldest to newest, flattened as `x, y, z` triples.
    pub fn positions(&self) -> Vec<f64> {
        self.positions.clone()
    }

    /// Colours matching `positions`, flattened as `r, g, b` triples.
    pub fn colors(&self) -> Vec<f32> {
        self.colors.clone()
    }

    /// Point counts of the contiguous arcs in `positions`.
    pub fn segment_lengths(&self) -> Vec<u32> {
        self.segment_lengths.clone()
    }
}

pub(crate) fn parse_mode(mode: &str) -> Result<BufferMode> {
    mode.parse::<BufferMode>()
        .with_context(|| format!("Unknown buffer mode: {mode}"))
}

pub(crate) fn build_config(
    start: &[f64],
    dt: f64,
    capacity: u32,
    mode: &str,
) -> Result<SimulationConfig> {
    let start: [f64; 3] = start
        .try_into()
        .map_err(|_| anyhow!("Starting point needs 3 coordinates, got {}", start.len()))?;
    Ok(SimulationConfig {
        dt,
        start,
        capacity: capacity as usize,
        mode: parse_mode(mode)?,
        ..SimulationConfig::default()
    })
}

pub(crate) fn build_equations(equations: &[String]) -> Result<EquationSet> {
    let [x, y, z] = equations else {
        return Err(anyhow!("Expected 3 equations, got {}", equations.len()));
    };
    EquationSet::parse([x.as_str(), y.as_str(), z.as_str()]).context("Invalid equation set")
}

fn describe(report: ConfigureReport) -> Vec<String> {
    report.adjustments.iter().map(ToString::to_string).collect()
}

fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

#[wasm_bindgen]
impl WasmSimulation {
    /// Builds a simulation from three prefix-notation equations.
    #[wasm_bindgen(constructor)]
    pub fn new(
        equations: Vec<String>,
        start: Vec<f64>,
        dt: f64,
        capacity: u32,
        mode: &str,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let system = build_equations(&equations).map_err(to_js)?;
        let config = build_config(&start, dt, capacity, mode).map_err(to_js)?;
        let controller = Controller::new(system, config)
            .context("Invalid simulation settings")
            .map_err(to_js)?;
        Ok(WasmSimulation { controller })
    }

    /// Builds a simulation from equations and a partial `SimulationConfig`
    /// object; absent fields take their defaults.
    pub fn with_config(
        equations: Vec<String>,
        config_val: JsValue,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let system = build_equations(&equations).map_err(to_js)?;
        let config: SimulationConfig = from_value(config_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;
        let controller = Controller::new(system, config)
            .context("Invalid simulation settings")
            .map_err(to_js)?;
        Ok(WasmSimulation { controller })
    }

    pub fn from_preset(
        name: &str,
        dt: f64,
        capacity: u32,
        mode: &str,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let preset: Preset = name.parse().map_err(|e: String| JsValue::from_str(&e))?;
        let config = build_config(preset.start().as_slice(), dt, capacity, mode).map_err(to_js)?;
        let controller = Controller::from_preset(preset, config)
            .context("Invalid simulation settings")
            .map_err(to_js)?;
        Ok(WasmSimulation { controller })
    }

    /// Advances one frame. Returns the number of integration steps taken.
    pub fn tick(&mut self) -> u32 {
        self.controller.tick().steps
    }

    pub fn reset(&mut self) {
        self.controller.reset();
    }

    /// Replaces the equations. On error the running system is kept.
    pub fn set_equations(&mut self, equations: Vec<String>) -> Result<(), JsValue> {
        let system = build_equations(&equations).map_err(to_js)?;
        self.controller.set_system(system);
        Ok(())
    }

    /// Applies a named command such as `"halve_step"`. Returns a description
    /// of every value that had to be clamped.
    pub fn command(&mut self, name: &str) -> Result<Vec<String>, JsValue> {
        let command: Command = name.parse().map_err(|e: String| JsValue::from_str(&e))?;
        Ok(describe(self.controller.apply(command)))
    }

    /// Applies a partial `ConfigureOptions` object.
    pub fn configure(&mut self, options_val: JsValue) -> Result<Vec<String>, JsValue> {
        let options: ConfigureOptions = from_value(options_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))?;
        Ok(describe(self.controller.configure(options)))
    }

    /// Full buffer state, every slot included. Renderers should draw from
    /// `frame` instead.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_value(&self.controller.snapshot())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn frame(&self) -> Frame {
        let view = self.controller.ordered_view();
        let mut positions = Vec::with_capacity(view.len() * 3);
        let mut colors = Vec::with_capacity(view.len() * 3);
        for point in view.iter() {
            positions.extend_from_slice(point.position.as_slice());
            colors.extend_from_slice(&point.color);
        }
        Frame {
            positions,
            colors,
            segment_lengths: view.segments().map(|s| s.len() as u32).collect(),
        }
    }

    pub fn get_state(&self) -> Vec<f64> {
        self.controller.state().as_slice().to_vec()
    }

    pub fn get_t(&self) -> f64 {
        self.controller.time()
    }

    pub fn get_steps(&self) -> f64 {
        self.controller.steps() as f64
    }

    pub fn get_dt(&self) -> f64 {
        self.controller.config().dt
    }

    pub fn get_render_speed(&self) -> u32 {
        self.controller.config().render_speed
    }

    pub fn is_paused(&self) -> bool {
        self.controller.config().paused
    }

    pub fn show_axes(&self) -> bool {
        self.controller.config().show_axes
    }

    pub fn center_cross(&self) -> bool {
        self.controller.config().center_cross
    }

    pub fn capacity(&self) -> u32 {
        self.controller.buffer().capacity() as u32
    }

    /// Simulated time at which the state first became non-finite.
    pub fn diverged_at(&self) -> Option<f64> {
        self.controller.divergence().map(|d| d.time)
    }

    pub fn equations(&self) -> Vec<String> {
        self.controller.equations().sources().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorenz_sources() -> Vec<String> {
        Preset::Lorenz.sources().iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn simulation_tick_records_points() {
        let mut sim = WasmSimulation::new(lorenz_sources(), vec![0.1, 0.1, 0.1], 0.01, 100, "ring")
            .expect("simulation");

        assert_eq!(sim.tick(), 1);
        assert_eq!(sim.frame().positions().len(), 3);
        assert_eq!(sim.frame().colors().len(), 3);
        assert_eq!(sim.frame().positions(), sim.get_state());
        assert!((sim.get_t() - 0.01).abs() < 1e-15);
        assert_eq!(sim.get_steps(), 1.0);
    }

    #[test]
    fn ring_wrap_produces_two_segments() {
        let mut sim = WasmSimulation::from_preset("lorenz", 0.01, 8, "ring").expect("simulation");
        for _ in 0..11 {
            sim.tick();
        }
        assert_eq!(sim.frame().segment_lengths(), vec![5, 3]);
        assert_eq!(sim.frame().positions().len(), 8 * 3);
        let positions = sim.frame().positions();
        assert_eq!(&positions[positions.len() - 3..], sim.get_state().as_slice());
    }

    #[test]
    fn halted_buffer_stops_growing() {
        let mut sim = WasmSimulation::from_preset("rossler", 0.01, 4, "halt").expect("simulation");
        for _ in 0..10 {
            sim.tick();
        }
        assert_eq!(sim.frame().segment_lengths(), vec![4]);
        assert_eq!(sim.get_steps(), 10.0);
    }

    #[test]
    fn commands_update_configuration() {
        let mut sim = WasmSimulation::from_preset("lorenz", 0.01, 16, "ring").expect("simulation");
        assert!(sim.command("double_speed").expect("command").is_empty());
        assert_eq!(sim.get_render_speed(), 2);
        assert!(sim.command("halve_step").expect("command").is_empty());
        assert!((sim.get_dt() - 0.005).abs() < 1e-15);
        sim.command("toggle_pause").expect("command");
        assert!(sim.is_paused());
        assert_eq!(sim.tick(), 0);

        let clamped = sim.command("halve_speed").and_then(|_| sim.command("halve_speed"));
        assert_eq!(clamped.expect("command").len(), 1);
        assert_eq!(sim.get_render_speed(), 1);
    }

    #[test]
    fn reset_and_equation_swap() {
        let mut sim = WasmSimulation::from_preset("lorenz", 0.01, 16, "ring").expect("simulation");
        sim.tick();
        sim.reset();
        assert!(sim.frame().positions().is_empty());
        assert_eq!(sim.get_state(), vec![0.1, 0.1, 0.1]);

        sim.set_equations(vec!["y".into(), "z".into(), "x".into()])
            .expect("swap");
        assert_eq!(sim.equations(), vec!["y", "z", "x"]);
    }

    #[test]
    fn divergence_is_reported() {
        let mut sim = WasmSimulation::new(
            vec!["(/ 1 0)".into(), "0".into(), "0".into()],
            vec![0.0, 0.0, 0.0],
            0.5,
            16,
            "ring",
        )
        .expect("simulation");
        assert_eq!(sim.diverged_at(), None);
        sim.tick();
        assert_eq!(sim.diverged_at(), Some(0.5));
        assert_eq!(sim.frame().positions().len(), 3);
    }

    #[test]
    fn build_helpers_explain_failures() {
        let err = build_equations(&["x".to_string()]).expect_err("too few equations");
        assert!(err.to_string().contains("Expected 3 equations"));

        let err = build_equations(&["x".to_string(), "w".to_string(), "z".to_string()])
            .expect_err("unknown variable");
        assert!(format!("{err:#}").contains("Unknown variable: w"));

        let err = build_config(&[0.0, 1.0], 0.01, 10, "ring").expect_err("short start");
        assert!(err.to_string().contains("3 coordinates"));

        let err = parse_mode("spiral").expect_err("unknown mode");
        assert!(format!("{err:#}").contains("Unknown buffer mode: spiral"));
        assert_eq!(parse_mode("append_then_halt").expect("mode"), BufferMode::AppendThenHalt);
        assert_eq!(parse_mode("halt").expect("mode"), BufferMode::AppendThenHalt);
    }

    #[test]
    fn frame_arrays_line_up() {
        let mut sim = WasmSimulation::from_preset("rossler", 0.01, 6, "ring").expect("simulation");
        for _ in 0..9 {
            sim.tick();
        }
        let frame = sim.frame();
        let lengths = frame.segment_lengths();
        assert_eq!(lengths.iter().sum::<u32>() as usize * 3, frame.positions().len());
        assert_eq!(frame.positions().len(), frame.colors().len());
        assert_eq!(lengths, vec![3, 3]);
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn simulation_rejects_unknown_preset() {
        let result = WasmSimulation::from_preset("duffing", 0.01, 16, "ring");
        assert!(result.is_err(), "expected unknown preset error");
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn simulation_rejects_zero_capacity() {
        let result = WasmSimulation::new(lorenz_sources(), vec![0.1, 0.1, 0.1], 0.01, 0, "ring");
        assert!(result.is_err(), "expected degenerate capacity error");
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn failed_swap_keeps_running_system() {
        let mut sim = WasmSimulation::from_preset("lorenz", 0.01, 16, "ring").expect("simulation");
        let result = sim.set_equations(vec!["x".into(), "(+ y".into(), "z".into()]);
        assert!(result.is_err());
        assert_eq!(sim.equations()[0], "(* 10 (- y x))");
    }
}
