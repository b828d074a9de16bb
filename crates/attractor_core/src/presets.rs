//! Built-in systems offered on the start menu.

use crate::equation_engine::EquationSet;
use crate::error::Result;
use crate::State;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// sigma = 10, rho = 28, beta = 8/3.
    Lorenz,
    /// a = 0.2, b = 0.2, c = 5.7.
    Rossler,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Lorenz, Preset::Rossler];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Lorenz => "lorenz",
            Preset::Rossler => "rossler",
        }
    }

    /// `dx/dt`, `dy/dt`, `dz/dt` in prefix notation.
    pub fn sources(self) -> [&'static str; 3] {
        match self {
            Preset::Lorenz => [
                "(* 10 (- y x))",
                "(- (* x (- 28 z)) y)",
                "(- (* x y) (* (/ 8 3) z))",
            ],
            Preset::Rossler => [
                "(- 0 (+ y z))",
                "(+ x (* (/ 1 5) y))",
                "(+ (/ 1 5) (* z (- x (/ 57 10))))",
            ],
        }
    }

    pub fn start(self) -> State {
        State::new(0.1, 0.1, 0.1)
    }

    pub fn equations(self) -> Result<EquationSet> {
        EquationSet::parse(self.sources())
    }

    /// Menu numbering: 1 for Lorenz, 2 for Rössler.
    pub fn from_menu_choice(choice: u32) -> Option<Self> {
        match choice {
            1 => Some(Preset::Lorenz),
            2 => Some(Preset::Rossler),
            _ => None,
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lorenz" => Ok(Preset::Lorenz),
            "rossler" | "rössler" => Ok(Preset::Rossler),
            other => Err(format!("Unknown preset: {other}")),
        }
    }
}
