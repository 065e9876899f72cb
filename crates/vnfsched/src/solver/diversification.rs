use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{Level, debug, instrument, warn};

use crate::{
    problem::{network::Network, service::Service, timeslot::Timeslot},
    solver::{
        configuration::Configuration, heuristic::construct_configuration,
        solver_params::DiversificationParams,
    },
};

/// Random probes drawn per configuration before giving up on it.
const MAX_PROBES: usize = 32;

/// Builds alternative start times for every service so the integral solve has
/// more than the CG columns to choose from.
///
/// Configuration 0 starts every service at `earliest_start` and fixes its
/// minimum service time. Configuration `j` tries `earliest + j * min`, then
/// `earliest + j`, then seeded random starts that still leave room for the
/// minimum service time.
#[instrument(skip_all, level = Level::DEBUG)]
pub fn diversify(
    services: &[Service],
    network: &Network,
    horizon: Timeslot,
    earliest_start: Timeslot,
    params: &DiversificationParams,
) -> Vec<Configuration> {
    let mut configurations = vec![];

    for service in services {
        let base = match construct_configuration(service, network, horizon, earliest_start) {
            Ok(configuration) => configuration,
            Err(error) => {
                warn!(%error, "cannot diversify service");
                continue;
            }
        };
        let min_service_time = base.completion_time() - earliest_start;
        configurations.push(base);

        let mut rng = SmallRng::seed_from_u64(probe_seed(params.seed, service));
        for j in 1..params.configurations_per_service {
            let Some(start) =
                candidate_start(earliest_start, min_service_time, horizon, j, &mut rng)
            else {
                debug!(service = %service.id(), j, "no start leaves room for the service");
                continue;
            };

            match construct_configuration(service, network, horizon, start) {
                Ok(configuration) => configurations.push(configuration),
                Err(error) => debug!(%error, start, "diversified configuration rejected"),
            }
        }
    }

    configurations
}

fn fits(start: Timeslot, min_service_time: Timeslot, horizon: Timeslot) -> bool {
    start
        .checked_add(min_service_time)
        .is_some_and(|end| end <= horizon)
}

fn candidate_start(
    earliest_start: Timeslot,
    min_service_time: Timeslot,
    horizon: Timeslot,
    j: usize,
    rng: &mut SmallRng,
) -> Option<Timeslot> {
    let j = j as Timeslot;

    let by_multiple = earliest_start.saturating_add(j.saturating_mul(min_service_time));
    if fits(by_multiple, min_service_time, horizon) {
        return Some(by_multiple);
    }

    let by_offset = earliest_start.saturating_add(j);
    if fits(by_offset, min_service_time, horizon) {
        return Some(by_offset);
    }

    if earliest_start > horizon {
        return None;
    }
    (0..MAX_PROBES)
        .map(|_| rng.random_range(earliest_start..=horizon))
        .find(|&start| fits(start, min_service_time, horizon))
}

fn probe_seed(seed: u64, service: &Service) -> u64 {
    seed ^ (service.arrival_id() as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{self, TestNetwork};

    use super::*;

    #[test]
    fn test_candidate_start_prefers_multiples() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(candidate_start(2, 5, 30, 1, &mut rng), Some(7));
        assert_eq!(candidate_start(2, 5, 30, 2, &mut rng), Some(12));
        // 2 + 5 * 5 leaves no room, fall back to 2 + 5
        assert_eq!(candidate_start(2, 5, 30, 5, &mut rng), Some(7));
    }

    #[test]
    fn test_candidate_start_random_fallback_fits() {
        let mut rng = SmallRng::seed_from_u64(7);
        // neither 0 + 9 * 4 nor 0 + 9 fits into 12 slots
        let start = candidate_start(0, 4, 12, 9, &mut rng).unwrap();
        assert!(start + 4 <= 12);
        assert_eq!(candidate_start(0, 20, 12, 1, &mut rng), None);
    }

    #[test]
    fn test_diversify_generates_shifted_configurations() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let services = vec![
            test_utils::two_stage_service(0, 5, 10, (2, 3)),
            test_utils::two_stage_service(1, 5, 10, (1, 1)),
        ];
        let params = DiversificationParams {
            configurations_per_service: 3,
            seed: 1,
        };

        let configurations = diversify(&services, &network, 30, 2, &params);

        let starts: Vec<(usize, Timeslot)> = configurations
            .iter()
            .map(|c| (c.service().get(), c.schedule().processing_start[0]))
            .collect();
        // service 0 takes 7 slots, service 1 takes 4
        assert_eq!(
            starts,
            vec![(0, 2), (0, 9), (0, 16), (1, 2), (1, 6), (1, 10)]
        );
    }

    #[test]
    fn test_diversify_is_deterministic() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let services = vec![test_utils::two_stage_service(0, 5, 10, (2, 3))];
        let params = DiversificationParams {
            configurations_per_service: 6,
            seed: 3,
        };

        let first = diversify(&services, &network, 14, 0, &params);
        let second = diversify(&services, &network, 14, 0, &params);
        assert_eq!(first, second);
        assert!(first.iter().all(|c| c.completion_time() <= 14));
    }
}
