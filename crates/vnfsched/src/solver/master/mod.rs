pub mod capacity;
pub mod linear_program;
pub mod lp_solver;
pub mod master_problem;
