use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder, prelude::*};
use tracing::debug;

use crate::{
    error::ConstructionError,
    problem::service::{Service, ServiceIdx},
    solver::{
        configuration::Configuration,
        pricing::pricing_problem::{PricingContext, PricingProblem, PricingSolution},
        solver_params::PricingMode,
    },
};

/// Outcome of one service's pricing solve within one CG iteration.
#[derive(Debug, Clone)]
pub struct ServicePricing {
    pub service: ServiceIdx,
    pub solution: Option<PricingSolution>,
    pub incumbents: Vec<(Configuration, f64)>,
}

impl ServicePricing {
    /// The pricing value, or negative infinity when no schedule fits.
    pub fn value(&self) -> f64 {
        self.solution
            .as_ref()
            .map_or(f64::NEG_INFINITY, |solution| solution.value)
    }
}

pub fn price_service(
    context: PricingContext<'_>,
    service: &Service,
) -> Result<ServicePricing, ConstructionError> {
    let mut incumbents = vec![];
    let solution = PricingProblem::new(context, service)
        .solve(|configuration, value| incumbents.push((configuration, value)))?;

    Ok(ServicePricing {
        service: service.id(),
        solution,
        incumbents,
    })
}

/// Runs every service's pricing problem for one iteration. Results are only
/// returned once all solves are done.
pub enum PricingRunner {
    Sequential,
    Threaded(ThreadPool),
}

impl PricingRunner {
    pub fn new(mode: &PricingMode) -> Result<Self, ThreadPoolBuildError> {
        Ok(match mode {
            PricingMode::Sequential => PricingRunner::Sequential,
            PricingMode::Threaded(threads) => PricingRunner::Threaded(
                ThreadPoolBuilder::new()
                    .num_threads(threads.number_of_threads())
                    .thread_name(|index| format!("pricing-{index}"))
                    .build()?,
            ),
        })
    }

    pub fn price(
        &self,
        context: PricingContext<'_>,
        services: &[Service],
    ) -> Result<Vec<ServicePricing>, ConstructionError> {
        match self {
            PricingRunner::Sequential => services
                .iter()
                .map(|service| price_service(context, service))
                .collect(),
            PricingRunner::Threaded(pool) => {
                debug!(
                    threads = pool.current_num_threads(),
                    services = services.len(),
                    "threaded pricing"
                );
                pool.install(|| {
                    services
                        .par_iter()
                        .map(|service| price_service(context, service))
                        .collect()
                })
            }
        }
    }
}
