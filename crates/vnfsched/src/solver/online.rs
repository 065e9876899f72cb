use std::sync::Arc;

use serde::Serialize;
use tracing::{Level, info, instrument, warn};

use crate::{
    error::BatchError,
    problem::{
        network::Network,
        service::{Service, ServiceIdx},
        timeslot::{SlotRange, Timeslot},
    },
    solver::{
        batch::{Batch, RejectedBatch},
        column_generation::{BatchInput, ColumnGeneration},
        configuration::Configuration,
        heuristic::map_schedule_services,
        master::lp_solver::LpSolver,
        solver_params::SolverParams,
    },
    timer_debug,
};

/// Services arriving in one window, re-indexed `0..n` in arrival order.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub window: SlotRange,
    pub services: Vec<Service>,
}

/// Groups services into consecutive windows of `window` slots, skipping empty
/// windows.
pub fn prepare_batches(mut services: Vec<Service>, window: Timeslot) -> Vec<PreparedBatch> {
    let window = window.max(1);
    services.sort_by_key(|service| (service.arrival(), service.arrival_id()));

    let mut batches: Vec<PreparedBatch> = vec![];
    for service in services {
        let start = service.arrival() / window * window;
        match batches.last_mut() {
            Some(batch) if batch.window.start == start => {
                let id = ServiceIdx::new(batch.services.len());
                batch.services.push(service.with_id(id));
            }
            _ => batches.push(PreparedBatch {
                window: SlotRange::with_length(start, window),
                services: vec![service.with_id(ServiceIdx::new(0))],
            }),
        }
    }

    batches
}

#[derive(Debug, Default, Serialize)]
pub struct OnlineSummary {
    pub batches: Vec<Batch>,
    pub rejected: Vec<RejectedBatch>,
}

impl OnlineSummary {
    pub fn makespan(&self) -> Timeslot {
        self.batches.iter().map(Batch::makespan).max().unwrap_or(0)
    }

    pub fn scheduled_services(&self) -> usize {
        self.batches
            .iter()
            .map(|batch| batch.configurations().len())
            .sum()
    }

    pub fn rejected_services(&self) -> usize {
        self.rejected.iter().map(|batch| batch.services.len()).sum()
    }
}

/// Runs one column-generation batch per arrival window, carrying committed
/// resource usage from each batch into the next.
pub struct OnlineScheduler<'a, S> {
    network: &'a Network,
    params: &'a SolverParams,
    column_generation: ColumnGeneration<'a, S>,
    committed: Vec<Arc<Configuration>>,
}

impl<'a, S: LpSolver + Clone> OnlineScheduler<'a, S> {
    pub fn new(
        network: &'a Network,
        params: &'a SolverParams,
        solver: S,
    ) -> Result<Self, BatchError> {
        Ok(OnlineScheduler {
            network,
            params,
            column_generation: ColumnGeneration::new(network, params, solver)?,
            committed: vec![],
        })
    }

    /// Configurations committed by every batch so far.
    pub fn committed(&self) -> &[Arc<Configuration>] {
        &self.committed
    }

    pub fn committed_makespan(&self) -> Timeslot {
        self.committed
            .iter()
            .map(|configuration| configuration.completion_time())
            .max()
            .unwrap_or(0)
    }

    #[instrument(skip_all, level = Level::DEBUG)]
    pub fn run(&mut self, services: Vec<Service>) -> OnlineSummary {
        let mut summary = OnlineSummary::default();

        for prepared in prepare_batches(services, self.params.batch_window) {
            let index = summary.batches.len() + summary.rejected.len();
            match self.run_batch(index, &prepared) {
                Ok(batch) => summary.batches.push(batch),
                Err(error) => {
                    warn!(batch = index, window = %prepared.window, %error, "batch rejected");
                    summary.rejected.push(RejectedBatch {
                        window: prepared.window,
                        services: prepared.services,
                        error,
                    });
                }
            }
        }

        info!(
            batches = summary.batches.len(),
            rejected = summary.rejected.len(),
            makespan = summary.makespan(),
            "online run finished"
        );

        summary
    }

    /// Runs one prepared window. On success the selected configurations are
    /// committed; on failure nothing changes.
    pub fn run_batch(
        &mut self,
        index: usize,
        prepared: &PreparedBatch,
    ) -> Result<Batch, BatchError> {
        let earliest_start = prepared.window.start.max(self.committed_makespan());
        let horizon = self.choose_horizon(&prepared.services, earliest_start)?;

        info!(
            batch = index,
            services = prepared.services.len(),
            earliest_start,
            horizon,
            "starting batch"
        );

        let batch = self.column_generation.run(BatchInput {
            index,
            window: prepared.window,
            services: prepared.services.clone(),
            earliest_start,
            horizon,
            prior: &self.committed,
        })?;

        self.committed
            .extend(batch.configurations().iter().map(Arc::clone));

        Ok(batch)
    }

    /// Probes the heuristic at the largest horizon, then leaves
    /// `horizon_slack` room over the span it needs past `earliest_start`.
    fn choose_horizon(
        &self,
        services: &[Service],
        earliest_start: Timeslot,
    ) -> Result<Timeslot, BatchError> {
        if services.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let max_horizon = self.params.max_horizon;
        let probe = timer_debug!(
            "horizon probe",
            map_schedule_services(services, self.network, max_horizon, earliest_start)
        )?;
        let makespan = probe
            .iter()
            .map(|configuration| configuration.completion_time())
            .max()
            .unwrap_or(earliest_start);

        let span = makespan.saturating_sub(earliest_start);
        let slack = (span as f64 * self.params.horizon_slack).ceil() as Timeslot;
        let horizon = earliest_start.saturating_add(slack).saturating_add(1);
        Ok(max_horizon.min(horizon.max(makespan)))
    }
}
