pub mod equation_engine;
pub mod error;
pub mod presets;
pub mod sexpr;
pub mod simulation;
pub mod solvers;
pub mod trajectory;
/// The `attractor_core` crate is the simulation kernel behind the attractor
/// visualizer. It turns three symbolic right-hand sides into a trajectory that
/// a renderer can draw every frame.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (flows), `Steppable` (solvers).
/// - **Equation Engine**: Prefix-notation equations compiled to bytecode and run on a small stack VM.
/// - **Solvers**: Fixed-step explicit Euler.
/// - **Trajectory**: A reusable ring of visited states with slot-derived colours.
/// - **Simulation**: The `Controller` that ties equations, state, configuration and trajectory together.
pub mod traits;

pub use equation_engine::{evaluate, EquationSet, Expr};
pub use error::{EngineError, ParseError};
pub use presets::Preset;
pub use sexpr::parse;
pub use simulation::{initialize, Command, ConfigureOptions, Controller, SimulationConfig};
pub use solvers::euler_step;
pub use trajectory::{BufferMode, OrderedView, TrajectoryBuffer};

/// A point in the three-dimensional state space, `(x, y, z)`.
pub type State = nalgebra::Vector3<f64>;
