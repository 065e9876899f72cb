pub mod dual_prices;
pub mod pricing_problem;
pub mod pricing_runner;
