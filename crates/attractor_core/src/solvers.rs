use crate::traits::{DynamicalSystem, Scalar, Steppable};
use crate::State;

/// Fixed-step explicit (forward) Euler solver.
///
/// `y_next = y + dt * f(y)`, with every component of `f` evaluated at the
/// same `y`. No clamping or finiteness checks are applied.
pub struct Euler<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(state, &mut self.deriv);

        for (y, dy) in state.iter_mut().zip(&self.deriv) {
            *y = *y + *dy * dt;
        }

        *t = *t + dt;
    }
}

/// One explicit Euler step from `state`, returning the new state.
pub fn euler_step(system: &impl DynamicalSystem<f64>, state: &State, dt: f64) -> State {
    let mut next = *state;
    let mut t = 0.0;
    Euler::new(3).step(system, &mut t, next.as_mut_slice(), dt);
    next
}
