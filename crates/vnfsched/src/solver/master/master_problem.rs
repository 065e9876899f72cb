use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::SolverError,
    problem::{
        network::{LinkIdx, Network, VnfIdx},
        service::ServiceIdx,
        timeslot::Timeslot,
    },
    solver::{
        configuration::{ColumnPool, Configuration},
        master::{
            capacity::ResidualCapacity,
            linear_program::{ColIdx, Column, LinearProgram, RowIdx},
            lp_solver::{LpOutcome, LpSolver},
        },
        pricing::dual_prices::DualPrices,
        solver_params::AdmissionConstraint,
    },
};

/// Objective reported when the LP or ILP has no solution.
pub const INFEASIBLE_OBJECTIVE: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Unbuilt,
    Built,
    SolvedLp,
    SolvedIlp,
    Closed,
}

#[derive(Debug, Clone)]
pub struct IlpSolution {
    pub objective: f64,
    /// One column per service, in service order. Empty when infeasible.
    pub selected: Vec<Arc<Configuration>>,
}

impl IlpSolution {
    pub fn is_feasible(&self) -> bool {
        !self.selected.is_empty()
    }
}

/// Restricted master problem of one batch.
///
/// ```text
/// min  rho
/// s.t. Σ_c λ_c               ≥ 1           (per service, or = 1)
///      Σ_c vnf_c(f,t) λ_c    ≤ cap(f,t)    (per VNF and slot)
///      Σ_c link_c(l,t) λ_c   ≤ cap(l,t)    (per link and slot)
///      rho - Σ_c C_c λ_c     ≥ 0           (per service)
/// ```
///
/// The relaxation leaves `λ` unbounded above; the integral solve restricts
/// every `λ` to `{0, 1}`.
pub struct MasterProblem<S> {
    solver: S,
    state: MasterState,
    admission: AdmissionConstraint,
    num_services: usize,
    num_vnfs: usize,
    num_links: usize,
    horizon: Timeslot,

    lp: LinearProgram,
    admission_rows: Vec<RowIdx>,
    makespan_rows: Vec<RowIdx>,
    first_vnf_row: usize,
    first_link_row: usize,

    pool: ColumnPool,
    lambdas: Vec<(Arc<Configuration>, ColIdx)>,
    residual: Option<ResidualCapacity>,
    duals: Option<DualPrices>,
    lp_objective: f64,
    incumbents: Vec<Configuration>,
}

impl<S: LpSolver> MasterProblem<S> {
    pub fn new(
        solver: S,
        num_services: usize,
        horizon: Timeslot,
        admission: AdmissionConstraint,
    ) -> Self {
        MasterProblem {
            solver,
            state: MasterState::Unbuilt,
            admission,
            num_services,
            num_vnfs: 0,
            num_links: 0,
            horizon,
            lp: LinearProgram::default(),
            admission_rows: vec![],
            makespan_rows: vec![],
            first_vnf_row: 0,
            first_link_row: 0,
            pool: ColumnPool::new(num_services),
            lambdas: vec![],
            residual: None,
            duals: None,
            lp_objective: INFEASIBLE_OBJECTIVE,
            incumbents: vec![],
        }
    }

    /// Creates every row, blocking capacity before `start` and subtracting
    /// what `prior` configurations consume, then adds the initial columns.
    pub fn build(
        &mut self,
        network: &Network,
        prior: &[Arc<Configuration>],
        start: Timeslot,
        initial: Vec<Configuration>,
    ) -> Result<(), SolverError> {
        self.expect_state(&[MasterState::Unbuilt], "build")?;

        let residual = ResidualCapacity::new(network, self.horizon, start, prior);
        self.num_vnfs = network.num_vnfs();
        self.num_links = network.num_links();

        let (admission_lower, admission_upper) = match self.admission {
            AdmissionConstraint::AtLeastOne => (1.0, f64::INFINITY),
            AdmissionConstraint::ExactlyOne => (1.0, 1.0),
        };
        self.admission_rows = (0..self.num_services)
            .map(|_| self.lp.add_row(admission_lower, admission_upper))
            .collect();
        self.makespan_rows = (0..self.num_services)
            .map(|_| self.lp.add_row(0.0, f64::INFINITY))
            .collect();

        self.first_vnf_row = self.lp.num_rows();
        for f in VnfIdx::range(self.num_vnfs) {
            for slot in 0..self.horizon {
                self.lp
                    .add_row(f64::NEG_INFINITY, residual.vnf(f, slot) as f64);
            }
        }

        self.first_link_row = self.lp.num_rows();
        for l in LinkIdx::range(self.num_links) {
            for slot in 0..self.horizon {
                self.lp
                    .add_row(f64::NEG_INFINITY, residual.link(l, slot) as f64);
            }
        }

        // rho
        self.lp.add_column(Column {
            cost: 1.0,
            lower: 0.0,
            upper: f64::INFINITY,
            integer: true,
            coefficients: self.makespan_rows.iter().map(|&row| (row, 1.0)).collect(),
        });

        self.residual = Some(residual);
        self.state = MasterState::Built;

        let added = self.add_columns_if_new(initial)?;
        debug!(
            rows = self.lp.num_rows(),
            columns = added,
            start,
            horizon = self.horizon,
            "master built"
        );

        Ok(())
    }

    /// Solves the relaxation. Returns the objective, or
    /// [`INFEASIBLE_OBJECTIVE`] leaving the previous duals in place.
    pub fn run_lp(&mut self) -> Result<f64, SolverError> {
        self.expect_state(&[MasterState::Built, MasterState::SolvedLp], "run_lp")?;

        match self.solver.solve_relaxation(&self.lp)? {
            LpOutcome::Optimal(solution) => {
                let y = &solution.row_duals;
                if y.len() != self.lp.num_rows() {
                    return Err(SolverError::Backend(format!(
                        "expected {} row duals, got {}",
                        self.lp.num_rows(),
                        y.len()
                    )));
                }

                let admission = self.admission_rows.iter().map(|row| y[row.get()]).collect();
                let makespan: Vec<f64> =
                    self.makespan_rows.iter().map(|row| y[row.get()]).collect();
                self.duals = Some(DualPrices::from_row_duals(
                    self.horizon,
                    admission,
                    &makespan,
                    &y[self.first_vnf_row..self.first_link_row],
                    &y[self.first_link_row..],
                ));
                self.lp_objective = solution.objective;
                self.state = MasterState::SolvedLp;
                Ok(solution.objective)
            }
            LpOutcome::Infeasible => {
                warn!("master LP infeasible");
                Ok(INFEASIBLE_OBJECTIVE)
            }
        }
    }

    /// Appends `configuration` as a new `λ` unless an equal column exists.
    pub fn add_column(
        &mut self,
        configuration: Configuration,
    ) -> Result<Option<Arc<Configuration>>, SolverError> {
        self.expect_state(&[MasterState::Built, MasterState::SolvedLp], "add_column")?;

        let service = configuration.service();
        if service.get() >= self.num_services {
            return Err(SolverError::InvalidModel(format!(
                "column for unknown service {service}"
            )));
        }
        if configuration.horizon() != self.horizon {
            return Err(SolverError::InvalidModel(format!(
                "column horizon {} differs from master horizon {}",
                configuration.horizon(),
                self.horizon
            )));
        }

        let Some(column) = self.pool.insert(configuration) else {
            return Ok(None);
        };

        let horizon = self.horizon as usize;
        let mut coefficients = vec![(self.admission_rows[service.get()], 1.0)];
        coefficients.extend(column.occupied_vnf_slots().map(|(f, slot)| {
            (
                RowIdx::new(self.first_vnf_row + f.get() * horizon + slot as usize),
                1.0,
            )
        }));
        coefficients.extend(column.occupied_link_slots().map(|(l, slot, bandwidth)| {
            (
                RowIdx::new(self.first_link_row + l.get() * horizon + slot as usize),
                bandwidth as f64,
            )
        }));
        coefficients.push((
            self.makespan_rows[service.get()],
            -(column.completion_time() as f64),
        ));

        let index = self.lp.add_column(Column {
            cost: 0.0,
            lower: 0.0,
            upper: f64::INFINITY,
            integer: true,
            coefficients,
        });
        self.lambdas.push((Arc::clone(&column), index));

        Ok(Some(column))
    }

    /// Returns how many of `configurations` were new.
    pub fn add_columns_if_new(
        &mut self,
        configurations: impl IntoIterator<Item = Configuration>,
    ) -> Result<usize, SolverError> {
        let mut added = 0;
        for configuration in configurations {
            if self.add_column(configuration)?.is_some() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Re-solves with `λ ∈ {0, 1}` and integral `rho`, selecting per service
    /// the shortest column whose `λ` rounds to one.
    pub fn run_ilp(&mut self) -> Result<IlpSolution, SolverError> {
        self.expect_state(&[MasterState::Built, MasterState::SolvedLp], "run_ilp")?;

        let mut ilp = self.lp.clone();
        for (_, index) in &self.lambdas {
            ilp.column_mut(*index).upper = 1.0;
        }

        let outcome = self.solver.solve_integer(&ilp)?;
        self.state = MasterState::SolvedIlp;

        let LpOutcome::Optimal(solution) = outcome else {
            warn!("master ILP infeasible");
            return Ok(IlpSolution {
                objective: INFEASIBLE_OBJECTIVE,
                selected: vec![],
            });
        };

        let mut chosen: Vec<Vec<&Arc<Configuration>>> = vec![vec![]; self.num_services];
        for (configuration, index) in &self.lambdas {
            if solution.columns[index.get()] >= 0.5 {
                chosen[configuration.service().get()].push(configuration);
            }
        }

        let mut selected = Vec::with_capacity(self.num_services);
        for (service, columns) in chosen.iter().enumerate() {
            if columns.len() > 1 {
                warn!(
                    service,
                    columns = columns.len(),
                    "integral solution admits more than one column"
                );
            }
            let best = columns
                .iter()
                .min_by_key(|column| column.completion_time())
                .ok_or_else(|| {
                    SolverError::Backend(format!("no column selected for service {service}"))
                })?;
            selected.push(Arc::clone(best));
        }

        Ok(IlpSolution {
            objective: solution.objective,
            selected,
        })
    }

    pub fn close(&mut self) {
        self.state = MasterState::Closed;
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn horizon(&self) -> Timeslot {
        self.horizon
    }

    pub fn num_services(&self) -> usize {
        self.num_services
    }

    /// Duals of the last successful relaxation.
    pub fn duals(&self) -> Option<&DualPrices> {
        self.duals.as_ref()
    }

    pub fn residual(&self) -> Option<&ResidualCapacity> {
        self.residual.as_ref()
    }

    pub fn lp_objective(&self) -> f64 {
        self.lp_objective
    }

    pub fn pool(&self) -> &ColumnPool {
        &self.pool
    }

    pub fn num_lambdas(&self) -> usize {
        self.lambdas.len()
    }

    pub fn column_exists(&self, candidate: &Configuration) -> bool {
        self.pool.contains(candidate)
    }

    pub fn columns_of(&self, service: ServiceIdx) -> &[Arc<Configuration>] {
        self.pool.columns_of(service)
    }

    /// Stashes a pricing solution for later, without turning it into a column.
    pub fn add_incumbent(&mut self, configuration: Configuration) {
        if !self.incumbents.contains(&configuration) {
            self.incumbents.push(configuration);
        }
    }

    pub fn incumbents(&self) -> &[Configuration] {
        &self.incumbents
    }

    pub fn take_incumbents(&mut self) -> Vec<Configuration> {
        std::mem::take(&mut self.incumbents)
    }

    fn expect_state(&self, allowed: &[MasterState], operation: &str) -> Result<(), SolverError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SolverError::InvalidModel(format!(
                "cannot {operation} in state {:?}",
                self.state
            )))
        }
    }
}
