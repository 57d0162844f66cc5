// Sinusoid steering planner demo
//
// Plans a quarter turn in place for a bicycle robot and plots the path and
// the heading/steering history.

use std::f64::consts::FRAC_PI_2;

use sinusoid_steering::common::{BicycleState, RoboticsResult};
use sinusoid_steering::path_planning::sinusoid::{
    BicycleConfigurationSpace, PlanContext, PlannerConfig, RetryPolicy, SingularityPolicy,
    SinusoidPlanner,
};
use sinusoid_steering::utils::{trajectory_plot, Visualizer};

fn main() -> RoboticsResult<()> {
    let space = BicycleConfigurationSpace::default();
    space.validate()?;
    let config = PlannerConfig::default().with_singularity_policy(SingularityPolicy::Rotate);
    let planner = SinusoidPlanner::with_config(&space, config)?;

    let start = BicycleState::new(1.0, 1.0, FRAC_PI_2, 0.0);
    let goal = BicycleState::new(1.0, 1.0, 0.0, 0.0);
    let dt = 0.01;
    let delta_t = 2.0;

    let mut ctx = PlanContext::with_seed(0).with_retry_policy(RetryPolicy::bounded(100, 200));
    let plan = planner.plan_to_pose_with(start, goal, dt, delta_t, &mut ctx)?;

    println!("samples: {}", plan.trajectory.len());
    println!("duration: {:.2} s", plan.trajectory.duration());
    println!("path length: {:.3} m", plan.trajectory.to_path().total_length());
    println!(
        "x maneuver: a1 = {:.4}, a2 = {:.4} ({} root searches, {} bound reductions)",
        plan.shooting.a1, plan.shooting.a2, plan.shooting.root_attempts, plan.shooting.shrink_rounds
    );
    if let Some(end) = plan.trajectory.end_position() {
        println!(
            "final pose: ({:.4}, {:.4}, {:.4}, {:.4})",
            end.x, end.y, end.theta, end.phi
        );
    }
    println!("terminal error: {:.4}", plan.terminal_error);

    std::fs::create_dir_all("img/path_planning").unwrap_or_default();

    let mut path_plot = trajectory_plot(&plan.trajectory, &start, &goal, "Sinusoid Steering");
    path_plot.save_png("img/path_planning/sinusoid_path.png", 800, 600)?;

    let mut history = Visualizer::new();
    history
        .set_title("Sinusoid Steering: heading and steering")
        .plot_state_history(&plan.trajectory);
    history.save_png("img/path_planning/sinusoid_state.png", 800, 600)?;

    println!("Plots saved to img/path_planning/");
    Ok(())
}
