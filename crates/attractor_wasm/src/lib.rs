//! WASM bindings for the attractor simulation kernel.

mod simulation;

use attractor_core::presets::Preset;
use wasm_bindgen::prelude::*;

pub use simulation::{Frame, WasmSimulation};

/// Names accepted by `WasmSimulation.from_preset`.
#[wasm_bindgen]
pub fn preset_names() -> Vec<String> {
    Preset::ALL.iter().map(|p| p.name().to_string()).collect()
}

/// The three equations of a preset, for pre-filling a manual-entry form.
#[wasm_bindgen]
pub fn preset_equations(name: &str) -> Result<Vec<String>, JsValue> {
    let preset: Preset = name.parse().map_err(|e: String| JsValue::from_str(&e))?;
    Ok(preset.sources().iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::{preset_equations, preset_names};

    #[test]
    fn presets_are_listed() {
        assert_eq!(preset_names(), vec!["lorenz", "rossler"]);
    }

    #[test]
    fn preset_equations_match_menu_entries() {
        let equations = preset_equations("rossler").expect("rossler exists");
        assert_eq!(equations.len(), 3);
        assert_eq!(equations[0], "(- 0 (+ y z))");
    }
}
