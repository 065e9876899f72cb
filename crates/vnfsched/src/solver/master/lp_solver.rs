use highs::{ColProblem, HighsModelStatus, Row, Sense};
use tracing::debug;

use crate::{error::SolverError, solver::master::linear_program::LinearProgram};

#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub objective: f64,
    pub columns: Vec<f64>,
    /// Shadow prices, `reduced cost = cost - Σ a·y`. Empty for integral solves.
    pub row_duals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    Optimal(LpSolution),
    Infeasible,
}

/// The optimisation backend the master problem delegates to.
pub trait LpSolver {
    /// Solves the continuous relaxation, ignoring integrality flags.
    fn solve_relaxation(&mut self, lp: &LinearProgram) -> Result<LpOutcome, SolverError>;

    /// Solves with integrality enforced on flagged columns.
    fn solve_integer(&mut self, lp: &LinearProgram) -> Result<LpOutcome, SolverError>;
}

/// HiGHS backend. The model is rebuilt from the [`LinearProgram`] on every
/// solve, so the relaxation always starts from the slack basis.
#[derive(Debug, Clone)]
pub struct HighsSolver {
    /// Presolve is left off for relaxations so row duals come straight from
    /// the simplex basis.
    pub presolve_relaxation: bool,
    pub mip_rel_gap: f64,
}

impl Default for HighsSolver {
    fn default() -> Self {
        HighsSolver {
            presolve_relaxation: false,
            mip_rel_gap: 1e-6,
        }
    }
}

impl HighsSolver {
    fn solve(&self, lp: &LinearProgram, integral: bool) -> Result<LpOutcome, SolverError> {
        if lp.num_columns() == 0 {
            return Err(SolverError::InvalidModel("model has no columns".to_owned()));
        }

        let mut problem = ColProblem::default();
        let rows: Vec<Row> = lp
            .rows()
            .iter()
            .map(|row| problem.add_row(row.lower..=row.upper))
            .collect();

        for column in lp.columns() {
            let factors = column
                .coefficients
                .iter()
                .map(|&(row, coefficient)| (rows[row.get()], coefficient));
            if integral && column.integer {
                problem.add_integer_column(column.cost, column.lower..=column.upper, factors);
            } else {
                problem.add_column(column.cost, column.lower..=column.upper, factors);
            }
        }

        let mut model = problem.optimise(Sense::Minimise);
        model.make_quiet();
        if integral {
            model.set_option("mip_rel_gap", self.mip_rel_gap);
        } else if !self.presolve_relaxation {
            model.set_option("presolve", "off");
        }

        let solved = model
            .try_solve()
            .map_err(|status| SolverError::Backend(format!("{status:?}")))?;

        match solved.status() {
            HighsModelStatus::Optimal => {
                let solution = solved.get_solution();
                let columns = solution.columns().to_vec();
                let row_duals = if integral {
                    vec![]
                } else {
                    solution.dual_rows().to_vec()
                };
                Ok(LpOutcome::Optimal(LpSolution {
                    objective: lp.objective_value(&columns),
                    columns,
                    row_duals,
                }))
            }
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                debug!(integral, "model infeasible");
                Ok(LpOutcome::Infeasible)
            }
            status => Err(SolverError::Backend(format!(
                "unexpected model status {status:?}"
            ))),
        }
    }
}

impl LpSolver for HighsSolver {
    fn solve_relaxation(&mut self, lp: &LinearProgram) -> Result<LpOutcome, SolverError> {
        self.solve(lp, false)
    }

    fn solve_integer(&mut self, lp: &LinearProgram) -> Result<LpOutcome, SolverError> {
        self.solve(lp, true)
    }
}
