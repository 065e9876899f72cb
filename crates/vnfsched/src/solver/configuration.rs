use std::sync::Arc;

use fixedbitset::FixedBitSet;
use serde::Serialize;

use crate::{
    error::ConstructionError,
    problem::{
        network::{Bandwidth, LinkIdx, Network, Route, VnfIdx},
        service::{Service, ServiceIdx},
        timeslot::{SlotRange, Timeslot},
    },
};

/// Where and when each part of a service runs.
///
/// `routes[i]` and `transmission_start[i]` describe virtual link `i`; a `None`
/// route means both middleboxes share a server and nothing is transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSchedule {
    pub mapping: Vec<VnfIdx>,
    pub routes: Vec<Option<Route>>,
    pub processing_start: Vec<Timeslot>,
    pub transmission_start: Vec<Timeslot>,
}

impl ServiceSchedule {
    pub fn processing_slots(&self, service: &Service, middlebox: usize) -> SlotRange {
        SlotRange::with_length(
            self.processing_start[middlebox],
            service.middlebox(middlebox).processing_time(),
        )
    }

    /// Slots during which virtual link `link` occupies its route. Empty when
    /// the endpoints are co-located.
    pub fn transmission_slots(&self, service: &Service, link: usize) -> SlotRange {
        match self.routes[link] {
            Some(_) => {
                SlotRange::with_length(self.transmission_start[link], service.transmission_time())
            }
            None => SlotRange::with_length(self.transmission_start[link], 0),
        }
    }

    /// Finish slot of the last middlebox, 0 for an empty chain.
    pub fn completion_time(&self, service: &Service) -> Timeslot {
        service
            .middleboxes()
            .len()
            .checked_sub(1)
            .map_or(0, |last| self.processing_slots(service, last).end)
    }
}

/// One feasible mapping, routing and schedule of one service, expanded into
/// its resource usage over `[0, horizon)`.
///
/// Equality only looks at the service, the completion time and both usage
/// matrices.
#[derive(Debug, Clone, Serialize)]
pub struct Configuration {
    service: ServiceIdx,
    completion_time: Timeslot,
    horizon: Timeslot,
    #[serde(skip)]
    vnf_usage: FixedBitSet,
    #[serde(skip)]
    link_usage: Vec<Bandwidth>,
    schedule: ServiceSchedule,
    id_per_service: Option<usize>,
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.completion_time == other.completion_time
            && self.horizon == other.horizon
            && self.vnf_usage == other.vnf_usage
            && self.link_usage == other.link_usage
    }
}

impl Eq for Configuration {}

impl Configuration {
    pub fn service(&self) -> ServiceIdx {
        self.service
    }

    pub fn completion_time(&self) -> Timeslot {
        self.completion_time
    }

    pub fn horizon(&self) -> Timeslot {
        self.horizon
    }

    pub fn schedule(&self) -> &ServiceSchedule {
        &self.schedule
    }

    /// Position in the owning service's column pool, once inserted.
    pub fn id_per_service(&self) -> Option<usize> {
        self.id_per_service
    }

    pub fn vnf_used(&self, vnf: VnfIdx, slot: Timeslot) -> bool {
        slot < self.horizon && self.vnf_usage.contains(self.slot_index(vnf.get(), slot))
    }

    pub fn link_used(&self, link: LinkIdx, slot: Timeslot) -> Bandwidth {
        if slot < self.horizon {
            self.link_usage[self.slot_index(link.get(), slot)]
        } else {
            0
        }
    }

    /// Every `(vnf, slot)` this configuration occupies.
    pub fn occupied_vnf_slots(&self) -> impl Iterator<Item = (VnfIdx, Timeslot)> + '_ {
        let horizon = self.horizon as usize;
        self.vnf_usage
            .ones()
            .map(move |bit| (VnfIdx::new(bit / horizon), (bit % horizon) as Timeslot))
    }

    /// Every `(link, slot, bandwidth)` with non-zero bandwidth.
    pub fn occupied_link_slots(&self) -> impl Iterator<Item = (LinkIdx, Timeslot, Bandwidth)> + '_ {
        let horizon = self.horizon as usize;
        self.link_usage
            .iter()
            .enumerate()
            .filter(|(_, bandwidth)| **bandwidth > 0)
            .map(move |(index, bandwidth)| {
                (
                    LinkIdx::new(index / horizon),
                    (index % horizon) as Timeslot,
                    *bandwidth,
                )
            })
    }

    pub(crate) fn with_id_per_service(mut self, id: usize) -> Self {
        self.id_per_service = Some(id);
        self
    }

    fn slot_index(&self, resource: usize, slot: Timeslot) -> usize {
        resource * self.horizon as usize + slot as usize
    }
}

/// Expands a scheduled service into its usage matrices over `[0, horizon)`.
pub fn build_service_configuration(
    service: &Service,
    schedule: ServiceSchedule,
    network: &Network,
    horizon: Timeslot,
) -> Result<Configuration, ConstructionError> {
    if service.middleboxes().is_empty() {
        return Err(ConstructionError::EmptyChain {
            service: service.id(),
        });
    }

    let completion_time = schedule.completion_time(service);
    if completion_time > horizon {
        return Err(ConstructionError::HorizonExceeded {
            service: service.id(),
            completion_time,
            horizon,
        });
    }

    let width = horizon as usize;
    let mut vnf_usage = FixedBitSet::with_capacity(network.num_vnfs() * width);
    let mut link_usage = vec![0; network.num_links() * width];

    for (middlebox, &vnf) in schedule.mapping.iter().enumerate() {
        for slot in schedule.processing_slots(service, middlebox).iter() {
            vnf_usage.insert(vnf.get() * width + slot as usize);
        }
    }

    for (link, route) in schedule.routes.iter().enumerate() {
        let Some(route) = route else {
            continue;
        };
        for slot in schedule.transmission_slots(service, link).iter() {
            for physical in route {
                link_usage[physical.get() * width + slot as usize] += service.bandwidth();
            }
        }
    }

    Ok(Configuration {
        service: service.id(),
        completion_time,
        horizon,
        vnf_usage,
        link_usage,
        schedule,
        id_per_service: None,
    })
}

/// Value-equality scan over one service's columns.
pub fn column_exists(columns: &[Arc<Configuration>], candidate: &Configuration) -> bool {
    columns.iter().any(|column| **column == *candidate)
}

/// Append-only columns, grouped per service.
#[derive(Debug, Clone, Default)]
pub struct ColumnPool {
    columns: Vec<Vec<Arc<Configuration>>>,
}

impl ColumnPool {
    pub fn new(num_services: usize) -> Self {
        ColumnPool {
            columns: vec![vec![]; num_services],
        }
    }

    pub fn columns_of(&self, service: ServiceIdx) -> &[Arc<Configuration>] {
        &self.columns[service.get()]
    }

    pub fn contains(&self, candidate: &Configuration) -> bool {
        self.columns
            .get(candidate.service().get())
            .is_some_and(|columns| column_exists(columns, candidate))
    }

    /// Inserts `candidate` unless an equal column is already pooled, assigning
    /// its position within the service's columns.
    pub fn insert(&mut self, candidate: Configuration) -> Option<Arc<Configuration>> {
        if self.contains(&candidate) {
            return None;
        }
        let columns = self.columns.get_mut(candidate.service().get())?;
        let column = Arc::new(candidate.with_id_per_service(columns.len()));
        columns.push(Arc::clone(&column));
        Some(column)
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Configuration>> {
        self.columns.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{self, TestNetwork};

    use super::*;

    fn schedule_at(start: Timeslot) -> ServiceSchedule {
        // f0 on s0 for 2 slots, link 0 for 2 slots, f1 on s1 for 3 slots
        ServiceSchedule {
            mapping: vec![VnfIdx::new(0), VnfIdx::new(1)],
            routes: vec![Some(Route::from_slice(&[LinkIdx::new(0)]))],
            processing_start: vec![start, start + 4],
            transmission_start: vec![start + 2],
        }
    }

    #[test]
    fn test_empty_chain_has_no_configuration() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = crate::problem::service::ServiceBuilder::default().build();
        let schedule = ServiceSchedule {
            mapping: vec![],
            routes: vec![],
            processing_start: vec![],
            transmission_start: vec![],
        };

        assert_eq!(schedule.completion_time(&service), 0);
        assert_eq!(
            build_service_configuration(&service, schedule, &network, 10),
            Err(ConstructionError::EmptyChain {
                service: ServiceIdx::new(0),
            })
        );
    }

    #[test]
    fn test_build_configuration_usage() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));

        let configuration =
            build_service_configuration(&service, schedule_at(1), &network, 10).unwrap();

        assert_eq!(configuration.completion_time(), 8);
        assert_eq!(
            configuration.occupied_vnf_slots().collect::<Vec<_>>(),
            vec![
                (VnfIdx::new(0), 1),
                (VnfIdx::new(0), 2),
                (VnfIdx::new(1), 5),
                (VnfIdx::new(1), 6),
                (VnfIdx::new(1), 7),
            ]
        );
        assert_eq!(
            configuration.occupied_link_slots().collect::<Vec<_>>(),
            vec![(LinkIdx::new(0), 3, 5), (LinkIdx::new(0), 4, 5)]
        );
        assert!(configuration.vnf_used(VnfIdx::new(1), 7));
        assert!(!configuration.vnf_used(VnfIdx::new(1), 8));
        assert_eq!(configuration.link_used(LinkIdx::new(0), 20), 0);
    }

    #[test]
    fn test_build_configuration_horizon_exceeded() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));

        let result = build_service_configuration(&service, schedule_at(1), &network, 7);
        assert_eq!(
            result,
            Err(ConstructionError::HorizonExceeded {
                service: ServiceIdx::new(0),
                completion_time: 8,
                horizon: 7,
            })
        );

        assert!(build_service_configuration(&service, schedule_at(1), &network, 8).is_ok());
    }

    #[test]
    fn test_equality_ignores_schedule_details() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));

        let a = build_service_configuration(&service, schedule_at(0), &network, 10).unwrap();
        let b = build_service_configuration(&service, schedule_at(0), &network, 10)
            .unwrap()
            .with_id_per_service(4);
        let c = build_service_configuration(&service, schedule_at(1), &network, 10).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_pool_insert_is_idempotent() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));
        let mut pool = ColumnPool::new(1);

        let first = build_service_configuration(&service, schedule_at(0), &network, 10).unwrap();
        let inserted = pool.insert(first.clone()).unwrap();
        assert_eq!(inserted.id_per_service(), Some(0));
        assert!(pool.contains(&first));

        assert!(pool.insert(first).is_none());
        assert_eq!(pool.len(), 1);

        let second = build_service_configuration(&service, schedule_at(2), &network, 10).unwrap();
        assert_eq!(pool.insert(second).unwrap().id_per_service(), Some(1));
        assert!(column_exists(
            pool.columns_of(ServiceIdx::new(0)),
            &inserted
        ));
    }
}
