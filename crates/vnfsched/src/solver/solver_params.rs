use serde::Serialize;

use crate::problem::timeslot::Timeslot;

#[derive(Clone, Debug)]
pub struct SolverParams {
    /// The CG loop stops once the pricing iteration counter exceeds this.
    pub max_pricing_iterations: usize,
    /// Pricing values at or below this are treated as "not improving".
    pub reduced_cost_tolerance: f64,
    /// Pricing states at least this valuable are kept as incumbents.
    pub incumbent_threshold: f64,
    pub max_incumbents_per_service: usize,

    pub pricing: PricingMode,
    /// Bandwidth-feasible paths considered per server pair during pricing.
    pub candidate_paths: usize,

    pub diversification: Option<DiversificationParams>,
    pub admission: AdmissionConstraint,

    pub batch_window: Timeslot,
    pub horizon_slack: f64,
    pub max_horizon: Timeslot,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            max_pricing_iterations: 25,
            reduced_cost_tolerance: 1e-10,
            incumbent_threshold: 1.0,
            max_incumbents_per_service: 8,

            pricing: PricingMode::Sequential,
            candidate_paths: 3,

            diversification: Some(DiversificationParams::default()),
            admission: AdmissionConstraint::AtLeastOne,

            batch_window: 10,
            horizon_slack: 1.5,
            max_horizon: 2048,
        }
    }
}

#[derive(Clone, Debug)]
pub enum PricingMode {
    Sequential,
    Threaded(Threads),
}

#[derive(Clone, Debug)]
pub enum Threads {
    Single,
    Auto,
    Multi(usize),
}

impl Threads {
    pub fn number_of_threads(&self) -> usize {
        match self {
            Threads::Single => 1,
            Threads::Multi(num) => (*num).max(1),
            Threads::Auto => std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiversificationParams {
    /// Extra configurations generated per service after the CG loop.
    pub configurations_per_service: usize,
    pub seed: u64,
}

impl Default for DiversificationParams {
    fn default() -> Self {
        DiversificationParams {
            configurations_per_service: 3,
            seed: 2427121,
        }
    }
}

/// Sense of the per-service admission row of the master problem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AdmissionConstraint {
    /// `Σ λ ≥ 1`
    #[default]
    AtLeastOne,
    /// `Σ λ = 1`
    ExactlyOne,
}
