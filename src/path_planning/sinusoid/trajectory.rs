//! Time-stamped trajectory of states and open-loop commands

use itertools::Itertools;

use crate::common::{BicycleState, ControlInput, Path2D};

/// One trajectory sample: the command applied from `state` at time `t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub t: f64,
    pub state: BicycleState,
    pub input: ControlInput,
}

impl TrajectorySample {
    pub fn new(t: f64, state: BicycleState, input: ControlInput) -> Self {
        Self { t, state, input }
    }
}

/// Planned trajectory
///
/// The last sample of a planner-generated trajectory is the pose reached after
/// the final command, paired with a zero command.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    samples: Vec<TrajectorySample>,
    dt: f64,
}

impl Trajectory {
    pub fn new(dt: f64) -> Self {
        Self { samples: Vec::new(), dt }
    }

    pub fn push(&mut self, t: f64, state: BicycleState, input: ControlInput) {
        self.samples.push(TrajectorySample::new(t, state, input));
    }

    /// Nominal step between samples [s]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    pub fn positions(&self) -> Vec<BicycleState> {
        self.samples.iter().map(|s| s.state).collect()
    }

    pub fn inputs(&self) -> Vec<ControlInput> {
        self.samples.iter().map(|s| s.input).collect()
    }

    pub fn start_time(&self) -> f64 {
        self.samples.first().map_or(0.0, |s| s.t)
    }

    pub fn end_time(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.t)
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    pub fn start_position(&self) -> Option<BicycleState> {
        self.samples.first().map(|s| s.state)
    }

    pub fn end_position(&self) -> Option<BicycleState> {
        self.samples.last().map(|s| s.state)
    }

    /// Largest `|u1|` and `|u2|` over the trajectory
    pub fn max_abs_input(&self) -> ControlInput {
        self.samples.iter().fold(ControlInput::zero(), |acc, s| {
            ControlInput::new(
                acc.v.max(s.input.v.abs()),
                acc.steering_rate.max(s.input.steering_rate.abs()),
            )
        })
    }

    /// Whether sample times never decrease
    pub fn is_time_ordered(&self) -> bool {
        self.samples.iter().tuple_windows().all(|(a, b)| b.t >= a.t)
    }

    pub fn to_path(&self) -> Path2D {
        Path2D::from_points(self.samples.iter().map(|s| s.state.position()).collect())
    }

    /// Concatenate trajectories end to end
    ///
    /// Each segment is shifted so it starts where the previous one ended, and
    /// its first sample replaces the previous terminal sample so the shared
    /// endpoint appears once.
    pub fn chain(trajectories: &[Trajectory]) -> Trajectory {
        let dt = trajectories.first().map_or(0.0, |t| t.dt);
        let mut samples: Vec<TrajectorySample> = Vec::new();

        for trajectory in trajectories.iter().filter(|t| !t.is_empty()) {
            let offset = match samples.last() {
                Some(last) => last.t - trajectory.start_time(),
                None => 0.0,
            };

            let mut shifted = trajectory.samples.iter().map(|s| TrajectorySample {
                t: s.t + offset,
                ..*s
            });

            if let Some(first) = shifted.next() {
                match samples.last_mut() {
                    Some(last) => *last = first,
                    None => samples.push(first),
                }
            }
            samples.extend(shifted);
        }

        Trajectory { samples, dt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(t0: f64, n: usize, dt: f64, x0: f64) -> Trajectory {
        let mut traj = Trajectory::new(dt);
        for k in 0..=n {
            let state = BicycleState::new(x0 + k as f64, 0.0, 0.0, 0.0);
            let input = if k < n { ControlInput::new(1.0, 0.0) } else { ControlInput::zero() };
            traj.push(t0 + k as f64 * dt, state, input);
        }
        traj
    }

    #[test]
    fn test_accessors() {
        let traj = segment(0.0, 4, 0.5, 0.0);
        assert_eq!(traj.len(), 5);
        assert!((traj.duration() - 2.0).abs() < 1e-12);
        assert_eq!(traj.end_position().unwrap().x, 4.0);
        assert_eq!(traj.max_abs_input().v, 1.0);
        assert_eq!(traj.inputs()[4], ControlInput::zero());
        assert_eq!(traj.to_path().len(), 5);
    }

    #[test]
    fn test_chain_rebases_time() {
        let a = segment(0.0, 4, 0.5, 0.0);
        let b = segment(0.0, 2, 0.5, 4.0);
        let chained = Trajectory::chain(&[a.clone(), b.clone()]);

        // Shared endpoint appears once
        assert_eq!(chained.len(), a.len() + b.len() - 1);
        assert!((chained.end_time() - 3.0).abs() < 1e-12);
        assert!((chained.duration() - (a.duration() + b.duration())).abs() < 1e-12);
        assert!(chained.is_time_ordered());
        assert_eq!(chained.end_position(), b.end_position());
    }

    #[test]
    fn test_chain_keeps_strictly_increasing_times() {
        let parts: Vec<Trajectory> = (0..4).map(|i| segment(0.0, 3, 0.1, i as f64 * 3.0)).collect();
        let chained = Trajectory::chain(&parts);

        assert!(chained
            .samples()
            .iter()
            .tuple_windows()
            .all(|(a, b)| b.t > a.t));
        assert!((chained.end_time() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_chain_skips_empty_segments() {
        let a = segment(0.0, 2, 1.0, 0.0);
        let chained = Trajectory::chain(&[Trajectory::new(1.0), a.clone(), Trajectory::new(1.0)]);
        assert_eq!(chained, a);
    }

    #[test]
    fn test_chain_of_nothing_is_empty() {
        let chained = Trajectory::chain(&[]);
        assert!(chained.is_empty());
        assert_eq!(chained.duration(), 0.0);
        assert!(chained.end_position().is_none());
    }
}
