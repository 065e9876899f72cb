use std::sync::Arc;

use jiff::SignedDuration;
use tracing::{Level, debug, info, instrument, warn};

use crate::{
    error::{BatchError, SolverError},
    problem::{
        network::Network,
        service::Service,
        timeslot::{SlotRange, Timeslot},
    },
    solver::{
        batch::{Batch, CgIterationStatistics},
        configuration::Configuration,
        diversification::diversify,
        heuristic::map_schedule_services,
        master::{
            capacity::verify_capacity,
            lp_solver::LpSolver,
            master_problem::{INFEASIBLE_OBJECTIVE, MasterProblem},
        },
        pricing::{pricing_problem::PricingContext, pricing_runner::PricingRunner},
        solver_params::SolverParams,
    },
    timed,
};

/// What a batch run needs besides the network and the parameters.
pub struct BatchInput<'a> {
    pub index: usize,
    pub window: SlotRange,
    /// Must carry ids `0..n` in order.
    pub services: Vec<Service>,
    pub earliest_start: Timeslot,
    pub horizon: Timeslot,
    /// Configurations committed by earlier batches.
    pub prior: &'a [Arc<Configuration>],
}

enum Termination {
    Converged,
    IterationCap,
    LpInfeasible,
    Stalled,
}

/// Runs the master/pricing loop for one batch at a time.
pub struct ColumnGeneration<'a, S> {
    network: &'a Network,
    params: &'a SolverParams,
    solver: S,
    runner: PricingRunner,
    /// Pricing solves over the lifetime of this executor.
    pricing_solutions: usize,
}

impl<'a, S: LpSolver + Clone> ColumnGeneration<'a, S> {
    pub fn new(
        network: &'a Network,
        params: &'a SolverParams,
        solver: S,
    ) -> Result<Self, BatchError> {
        let runner = PricingRunner::new(&params.pricing)
            .map_err(|error| SolverError::Backend(format!("pricing thread pool: {error}")))?;

        Ok(ColumnGeneration {
            network,
            params,
            solver,
            runner,
            pricing_solutions: 0,
        })
    }

    pub fn pricing_solutions(&self) -> usize {
        self.pricing_solutions
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(batch = input.index))]
    pub fn run(&mut self, input: BatchInput<'_>) -> Result<Batch, BatchError> {
        let BatchInput {
            index,
            window,
            services,
            earliest_start,
            horizon,
            prior,
        } = input;

        if services.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        debug_assert!(
            services.iter().enumerate().all(|(i, s)| s.id().get() == i),
            "batch services must be re-indexed"
        );

        let initial = map_schedule_services(&services, self.network, horizon, earliest_start)?;

        let mut master = MasterProblem::new(
            self.solver.clone(),
            services.len(),
            horizon,
            self.params.admission,
        );
        master.build(self.network, prior, earliest_start, initial)?;

        let solutions_before = self.pricing_solutions;
        let mut statistics = vec![];
        let mut lp_time = SignedDuration::ZERO;
        let mut lp_objective = INFEASIBLE_OBJECTIVE;

        let mut master_iteration = 0;
        let mut pricing_iteration = 1;
        let termination = loop {
            let (objective, elapsed) = timed!(master.run_lp());
            lp_time += elapsed;
            let objective = objective?;
            if objective == INFEASIBLE_OBJECTIVE {
                break Termination::LpInfeasible;
            }
            lp_objective = objective;

            let (Some(duals), Some(residual)) = (master.duals(), master.residual()) else {
                return Err(
                    SolverError::InvalidModel("solved master has no duals".to_owned()).into(),
                );
            };
            let context = PricingContext {
                network: self.network,
                duals,
                residual,
                earliest_start,
                candidate_paths: self.params.candidate_paths,
                incumbent_threshold: self.params.incumbent_threshold,
                max_incumbents: self.params.max_incumbents_per_service,
            };
            let results = self.runner.price(context, &services)?;

            let mut not_improving = 0;
            let mut columns_added = 0;
            for result in results {
                self.pricing_solutions += 1;
                let value = result.value();

                for (incumbent, _) in result.incumbents {
                    master.add_incumbent(incumbent);
                }

                match result.solution {
                    Some(solution) if value > self.params.reduced_cost_tolerance => {
                        if master.add_column(solution.configuration)?.is_some() {
                            columns_added += 1;
                        }
                    }
                    _ => not_improving += 1,
                }
            }

            debug!(
                master_iteration,
                pricing_iteration,
                lp_objective,
                columns_added,
                not_improving,
                "column generation iteration"
            );
            statistics.push(CgIterationStatistics {
                iteration: pricing_iteration,
                lp_objective,
                columns_added,
                not_improving,
            });

            if not_improving == services.len() {
                break Termination::Converged;
            }
            if pricing_iteration > self.params.max_pricing_iterations {
                break Termination::IterationCap;
            }
            if columns_added == 0 {
                break Termination::Stalled;
            }

            pricing_iteration += 1;
            master_iteration += 1;
        };

        let error = match termination {
            Termination::Converged => None,
            Termination::IterationCap => {
                warn!(pricing_iteration, "column generation hit the iteration cap");
                Some(format!(
                    "column generation stopped after {pricing_iteration} iterations without converging"
                ))
            }
            Termination::LpInfeasible => {
                warn!(pricing_iteration, "master LP infeasible");
                Some(format!(
                    "master LP infeasible at iteration {pricing_iteration}"
                ))
            }
            Termination::Stalled => {
                warn!(pricing_iteration, "pricing only produced known columns");
                Some(format!(
                    "pricing produced no new column at iteration {pricing_iteration}"
                ))
            }
        };

        let mut extra = master.take_incumbents();
        if let Some(diversification) = &self.params.diversification {
            extra.extend(diversify(
                &services,
                self.network,
                horizon,
                earliest_start,
                diversification,
            ));
        }
        let diversified = master.add_columns_if_new(extra)?;

        let (solution, ilp_time) = timed!(master.run_ilp());
        let solution = solution?;
        debug_assert!(
            verify_capacity(&solution.selected, prior, self.network, earliest_start).is_empty(),
            "integral solution violates capacity"
        );
        let columns = master.num_lambdas();
        master.close();

        let error = match (error, solution.is_feasible()) {
            (error, true) => error,
            (Some(error), false) => Some(format!("{error}; master ILP infeasible")),
            (None, false) => Some("master ILP infeasible".to_owned()),
        };

        let batch = Batch {
            index,
            window,
            services,
            earliest_start,
            horizon,
            configurations: solution.selected,
            lp_objective,
            ilp_objective: solution.objective,
            lp_time,
            ilp_time,
            cg_iterations: pricing_iteration,
            pricing_solutions: self.pricing_solutions - solutions_before,
            columns,
            error,
            statistics,
        };

        info!(
            batch = index,
            services = batch.services.len(),
            lp_objective = batch.lp_objective,
            ilp_objective = batch.ilp_objective,
            cg_iterations = batch.cg_iterations,
            columns,
            diversified,
            "batch finished"
        );

        Ok(batch)
    }
}
