use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{Level, debug, instrument};

use crate::{
    error::ConstructionError,
    problem::{
        network::{Network, Route, VnfIdx},
        service::Service,
        timeslot::Timeslot,
    },
    solver::configuration::{Configuration, ServiceSchedule, build_service_configuration},
};

/// Picks a VNF instance per middlebox, uniformly among instances of the
/// requested type, using the middlebox's own seed.
pub fn map_service(service: &Service, network: &Network) -> Result<Vec<VnfIdx>, ConstructionError> {
    if service.middleboxes().is_empty() {
        return Err(ConstructionError::EmptyChain {
            service: service.id(),
        });
    }

    service
        .middleboxes()
        .iter()
        .enumerate()
        .map(|(index, middlebox)| {
            let candidates = network.vnfs_of_type(middlebox.vnf_type());
            if candidates.is_empty() {
                return Err(ConstructionError::NoCapableVnf {
                    service: service.id(),
                    middlebox: index,
                    vnf_type: middlebox.vnf_type(),
                });
            }

            let mut rng = SmallRng::seed_from_u64(middlebox.seed());
            Ok(candidates[rng.random_range(0..candidates.len())])
        })
        .collect()
}

/// Routes each virtual link over the fewest-hop path able to carry the
/// service's bandwidth. Co-located endpoints get no route.
pub fn route_service(
    service: &Service,
    network: &Network,
    mapping: &[VnfIdx],
) -> Result<Vec<Option<Route>>, ConstructionError> {
    mapping
        .windows(2)
        .enumerate()
        .map(|(link, pair)| {
            let from = network.vnf(pair[0]).server();
            let to = network.vnf(pair[1]).server();
            if from == to {
                return Ok(None);
            }

            network
                .shortest_path(from, to, service.bandwidth())
                .map(Some)
                .ok_or(ConstructionError::NoFeasibleRoute {
                    service: service.id(),
                    link,
                    bandwidth: service.bandwidth(),
                })
        })
        .collect()
}

/// Schedules without waiting: every middlebox starts as soon as its
/// predecessor and the incoming transmission are done.
pub fn schedule_service(
    service: &Service,
    mapping: Vec<VnfIdx>,
    routes: Vec<Option<Route>>,
    earliest_start: Timeslot,
) -> ServiceSchedule {
    let transmission_time = service.transmission_time();
    let mut processing_start = Vec::with_capacity(mapping.len());
    let mut transmission_start = Vec::with_capacity(routes.len());

    let mut now = earliest_start;
    for (index, middlebox) in service.middleboxes().iter().enumerate() {
        processing_start.push(now);
        now += middlebox.processing_time();

        if let Some(route) = routes.get(index) {
            transmission_start.push(now);
            if route.is_some() {
                now += transmission_time;
            }
        }
    }

    ServiceSchedule {
        mapping,
        routes,
        processing_start,
        transmission_start,
    }
}

pub fn construct_service_schedule(
    service: &Service,
    network: &Network,
    earliest_start: Timeslot,
) -> Result<ServiceSchedule, ConstructionError> {
    let mapping = map_service(service, network)?;
    let routes = route_service(service, network, &mapping)?;
    Ok(schedule_service(service, mapping, routes, earliest_start))
}

/// Maps, routes and schedules one service starting at `earliest_start`.
pub fn construct_configuration(
    service: &Service,
    network: &Network,
    horizon: Timeslot,
    earliest_start: Timeslot,
) -> Result<Configuration, ConstructionError> {
    let schedule = construct_service_schedule(service, network, earliest_start)?;
    build_service_configuration(service, schedule, network, horizon)
}

/// One configuration per service, run back to back: each service may start
/// one slot after the previous one completes. Fails if any service fails.
#[instrument(skip_all, level = Level::DEBUG)]
pub fn map_schedule_services(
    services: &[Service],
    network: &Network,
    horizon: Timeslot,
    start: Timeslot,
) -> Result<Vec<Configuration>, ConstructionError> {
    let mut configurations = Vec::with_capacity(services.len());
    let mut earliest_start = start;

    for service in services {
        let configuration = construct_configuration(service, network, horizon, earliest_start)?;
        earliest_start = configuration.completion_time() + 1;
        configurations.push(configuration);
    }

    debug!(
        services = services.len(),
        makespan = earliest_start.saturating_sub(1),
        "heuristic construction done"
    );

    Ok(configurations)
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ConstructionError,
        problem::{
            network::{LinkIdx, NetworkBuilder},
            service::{ServiceBuilder, ServiceIdx},
        },
        test_utils::{self, TestNetwork},
    };

    use super::*;

    #[test]
    fn test_no_wait_schedule() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));

        let schedule = construct_service_schedule(&service, &network, 4).unwrap();

        assert_eq!(schedule.mapping, vec![VnfIdx::new(0), VnfIdx::new(1)]);
        assert_eq!(
            schedule.routes,
            vec![Some(Route::from_slice(&[LinkIdx::new(0)]))]
        );
        assert_eq!(schedule.processing_start, vec![4, 8]);
        assert_eq!(schedule.transmission_start, vec![6]);
        assert_eq!(schedule.completion_time(&service), 11);
    }

    #[test]
    fn test_colocated_middleboxes_skip_transmission() {
        let mut builder = NetworkBuilder::default();
        let server = builder.add_server("s0");
        let firewall = builder.add_vnf_type("firewall");
        let nat = builder.add_vnf_type("nat");
        builder.add_vnf("fw", firewall, server);
        builder.add_vnf("nat", nat, server);
        let network = builder.build();

        let mut service = ServiceBuilder::default();
        service
            .set_bandwidth(5)
            .set_traffic_size(100)
            .add_middlebox(firewall, 0, None)
            .add_middlebox(nat, 2, None)
            .add_middlebox(firewall, 0, None);
        let service = service.build();

        let configuration = construct_configuration(&service, &network, 10, 3).unwrap();

        assert_eq!(configuration.schedule().routes, vec![None, None]);
        assert_eq!(configuration.schedule().processing_start, vec![3, 3, 5]);
        assert_eq!(configuration.completion_time(), 5);
        assert_eq!(configuration.occupied_link_slots().count(), 0);
        // zero-time middleboxes occupy nothing
        assert_eq!(configuration.occupied_vnf_slots().count(), 2);
    }

    #[test]
    fn test_mapping_is_deterministic_per_seed() {
        let mut builder = NetworkBuilder::default();
        let server = builder.add_server("s0");
        let firewall = builder.add_vnf_type("firewall");
        for i in 0..8 {
            builder.add_vnf(format!("fw{i}"), firewall, server);
        }
        let network = builder.build();

        let mut service = ServiceBuilder::default();
        for seed in 0..6 {
            service.add_middlebox(firewall, 1, Some(seed));
        }
        let service = service.build();

        let first = map_service(&service, &network).unwrap();
        let second = map_service(&service, &network).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_vnf_type() {
        let mut builder = NetworkBuilder::default();
        builder.add_server("s0");
        let firewall = builder.add_vnf_type("firewall");
        let network = builder.build();

        let mut service = ServiceBuilder::default();
        service.add_middlebox(firewall, 1, None);
        let service = service.build();

        assert_eq!(
            map_service(&service, &network),
            Err(ConstructionError::NoCapableVnf {
                service: ServiceIdx::new(0),
                middlebox: 0,
                vnf_type: firewall,
            })
        );
    }

    #[test]
    fn test_empty_chain_is_a_construction_error() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let mut service = ServiceBuilder::default();
        service.set_arrival_id(3);
        let service = service.build();

        assert_eq!(
            map_schedule_services(&[service], &network, 10, 0),
            Err(ConstructionError::EmptyChain {
                service: ServiceIdx::new(3),
            })
        );
    }

    #[test]
    fn test_route_requires_bandwidth() {
        let TestNetwork { network, .. } = test_utils::two_server_network(4);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));

        assert_eq!(
            construct_service_schedule(&service, &network, 0),
            Err(ConstructionError::NoFeasibleRoute {
                service: ServiceIdx::new(0),
                link: 0,
                bandwidth: 5,
            })
        );
    }

    #[test]
    fn test_map_schedule_services_cascades_starts() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let services = vec![
            test_utils::two_stage_service(0, 5, 10, (2, 3)),
            test_utils::two_stage_service(1, 5, 10, (2, 3)),
        ];

        let configurations = map_schedule_services(&services, &network, 20, 2).unwrap();

        assert_eq!(configurations[0].completion_time(), 9);
        assert_eq!(configurations[1].schedule().processing_start[0], 10);
        assert_eq!(configurations[1].completion_time(), 17);
    }

    #[test]
    fn test_map_schedule_services_fails_as_a_whole() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let services = vec![
            test_utils::two_stage_service(0, 5, 10, (2, 3)),
            test_utils::two_stage_service(1, 5, 10, (2, 3)),
        ];

        let result = map_schedule_services(&services, &network, 12, 0);
        assert!(matches!(
            result,
            Err(ConstructionError::HorizonExceeded { service, .. }) if service == ServiceIdx::new(1)
        ));
    }

    #[test]
    fn test_rebuilding_configuration_is_deterministic() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));

        let schedule = construct_service_schedule(&service, &network, 1).unwrap();
        let first = build_service_configuration(&service, schedule.clone(), &network, 16).unwrap();
        let second = build_service_configuration(&service, schedule, &network, 16).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            construct_configuration(&service, &network, 16, 1).unwrap()
        );
    }
}
