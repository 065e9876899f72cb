pub mod batch;
pub mod column_generation;
pub mod configuration;
pub mod diversification;
pub mod heuristic;
pub mod master;
pub mod online;
pub mod pricing;
pub mod solver_params;
