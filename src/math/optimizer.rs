// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Guiding traits to implement iterative optimization algorithms.

/// Enum used to indicate if iterations should continue or stop.
/// Must be returned by the `stop_criterion` function.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Continue {
    /// Stop iterations.
    Stop,
    /// Continue iterations.
    Forward,
}

/// An `OptimizerState<Observations, EvalState, Model, Error>`
/// is capable of iteratively minimizing an energy function,
/// if provided few functions that are evaluated during iterations.
///
/// * `Observations`: the data used as reference during energy evaluations.
/// * `EvalState`: result of the evaluation of a new model.
///   It owns everything computed for the trial, so that keeping it
///   in `stop_criterion` is a move and dropping it leaves the state untouched.
/// * `Model`: the model of what you are trying to optimize.
/// * `Error`: error of the step computation.
///
/// The state is built beforehand by the implementor,
/// typically from an initial evaluation of the starting model.
pub trait OptimizerState<Observations, EvalState, Model, Error>
where
    Self: std::marker::Sized,
{
    /// Computes the iteration step from the current optimizer state.
    fn step(&self) -> Result<Model, Error>;

    /// Evaluates the model.
    /// Must not mutate the optimizer state.
    fn eval(&self, obs: &Observations, new_model: Model) -> EvalState;

    /// Converts a failed step computation into an evaluation state,
    /// letting `stop_criterion` decide what to do with it.
    fn step_failed(&self, error: Error) -> EvalState;

    /// Function deciding if iterations should continue.
    /// Also returns the state that will be used for next iteration, or returned if we stop.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue);

    /// Iteratively solve your optimization problem,
    /// with the provided functions by the trait implementation.
    /// Returns the final state and the number of iterations.
    fn iterative_solve(self, obs: &Observations) -> (Self, usize) {
        let mut state = self;
        let mut nb_iter = 0;
        loop {
            nb_iter += 1;
            let eval_state = match state.step() {
                Ok(new_model) => state.eval(obs, new_model),
                Err(error) => state.step_failed(error),
            };
            let (kept_state, continuation) = state.stop_criterion(nb_iter, eval_state);
            state = kept_state;
            if let Continue::Stop = continuation {
                return (state, nb_iter);
            }
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    /// Minimize (x - target)^2 with damped Newton steps,
    /// where odd steps fail to check error forwarding.
    struct Scalar1D {
        x: f32,
        damping: f32,
        nb_failures: usize,
    }

    impl OptimizerState<f32, Result<f32, f32>, f32, ()> for Scalar1D {
        fn step(&self) -> Result<f32, ()> {
            if self.nb_failures == 0 {
                Err(())
            } else {
                Ok(self.x)
            }
        }

        fn eval(&self, target: &f32, x: f32) -> Result<f32, f32> {
            Ok(x + (target - x) / (1.0 + self.damping))
        }

        fn step_failed(&self, _error: ()) -> Result<f32, f32> {
            Err(self.x)
        }

        fn stop_criterion(self, nb_iter: usize, eval_state: Result<f32, f32>) -> (Self, Continue) {
            let continuation = if nb_iter >= 10 {
                Continue::Stop
            } else {
                Continue::Forward
            };
            match eval_state {
                Ok(x) => (Self { x, ..self }, continuation),
                Err(_) => (
                    Self {
                        nb_failures: self.nb_failures + 1,
                        ..self
                    },
                    continuation,
                ),
            }
        }
    }

    #[test]
    fn failed_step_does_not_stop_iterations() {
        let state = Scalar1D {
            x: 0.0,
            damping: 0.0,
            nb_failures: 0,
        };
        let (state, nb_iter) = state.iterative_solve(&3.0);
        assert_eq!(nb_iter, 10);
        assert_eq!(state.nb_failures, 1);
        assert_eq!(state.x, 3.0);
    }
}
