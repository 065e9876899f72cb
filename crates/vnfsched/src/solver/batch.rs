use std::sync::Arc;

use jiff::SignedDuration;
use serde::Serialize;

use crate::{
    error::BatchError,
    problem::{
        service::{Service, ServiceIdx},
        timeslot::{SlotRange, Timeslot},
    },
    solver::configuration::Configuration,
};

#[derive(Debug, Clone, Serialize)]
pub struct CgIterationStatistics {
    pub iteration: usize,
    pub lp_objective: f64,
    pub columns_added: usize,
    pub not_improving: usize,
}

/// One column-generation run over a window of services.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub(crate) index: usize,
    pub(crate) window: SlotRange,
    pub(crate) services: Vec<Service>,
    pub(crate) earliest_start: Timeslot,
    pub(crate) horizon: Timeslot,
    pub(crate) configurations: Vec<Arc<Configuration>>,
    pub(crate) lp_objective: f64,
    pub(crate) ilp_objective: f64,
    pub(crate) lp_time: SignedDuration,
    pub(crate) ilp_time: SignedDuration,
    pub(crate) cg_iterations: usize,
    pub(crate) pricing_solutions: usize,
    pub(crate) columns: usize,
    pub(crate) error: Option<String>,
    pub(crate) statistics: Vec<CgIterationStatistics>,
}

impl Batch {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Arrival window the services were collected from.
    pub fn window(&self) -> SlotRange {
        self.window
    }

    /// Services with their batch-local ids `0..n`.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn earliest_start(&self) -> Timeslot {
        self.earliest_start
    }

    pub fn horizon(&self) -> Timeslot {
        self.horizon
    }

    /// Selected configuration per service, empty if the integral solve failed.
    pub fn configurations(&self) -> &[Arc<Configuration>] {
        &self.configurations
    }

    pub fn lp_objective(&self) -> f64 {
        self.lp_objective
    }

    pub fn ilp_objective(&self) -> f64 {
        self.ilp_objective
    }

    /// Total time spent in relaxations.
    pub fn lp_time(&self) -> SignedDuration {
        self.lp_time
    }

    pub fn ilp_time(&self) -> SignedDuration {
        self.ilp_time
    }

    pub fn cg_iterations(&self) -> usize {
        self.cg_iterations
    }

    pub fn pricing_solutions(&self) -> usize {
        self.pricing_solutions
    }

    /// Columns in the pool at the integral solve.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Set when the loop stopped for any reason other than convergence.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn statistics(&self) -> &[CgIterationStatistics] {
        &self.statistics
    }

    pub fn makespan(&self) -> Timeslot {
        self.configurations
            .iter()
            .map(|configuration| configuration.completion_time())
            .max()
            .unwrap_or(0)
    }

    /// Services whose selected completion time is after their deadline.
    pub fn missed_deadlines(&self) -> Vec<ServiceIdx> {
        self.configurations
            .iter()
            .filter(|configuration| {
                self.services[configuration.service().get()]
                    .deadline()
                    .is_some_and(|deadline| configuration.completion_time() > deadline)
            })
            .map(|configuration| configuration.service())
            .collect()
    }
}

/// A window whose services could not be scheduled at all.
#[derive(Debug, Serialize)]
pub struct RejectedBatch {
    pub window: SlotRange,
    pub services: Vec<Service>,
    #[serde(serialize_with = "serialize_error")]
    pub error: BatchError,
}

fn serialize_error<S: serde::Serializer>(
    error: &BatchError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
