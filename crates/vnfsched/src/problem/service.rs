use serde::Serialize;

use crate::{
    define_index_newtype,
    problem::{
        network::{Bandwidth, VnfType},
        timeslot::Timeslot,
    },
};

define_index_newtype!(ServiceIdx, Service);

/// One VNF request in a service chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Middlebox {
    vnf_type: VnfType,
    processing_time: Timeslot,
    /// Drives the choice of VNF instance, so the same seed maps the same way.
    seed: u64,
}

impl Middlebox {
    pub fn new(vnf_type: VnfType, processing_time: Timeslot, seed: u64) -> Self {
        Middlebox {
            vnf_type,
            processing_time,
            seed,
        }
    }

    pub fn vnf_type(&self) -> VnfType {
        self.vnf_type
    }

    /// Ingress and egress middleboxes take zero slots.
    pub fn processing_time(&self) -> Timeslot {
        self.processing_time
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// A network-service request: a chain of middleboxes joined by virtual links.
/// Virtual link `i` carries the traffic from middlebox `i` to middlebox `i + 1`.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    id: ServiceIdx,
    arrival_id: usize,
    external_id: String,
    arrival: Timeslot,
    deadline: Option<Timeslot>,
    bandwidth: Bandwidth,
    traffic_size: u32,
    middleboxes: Vec<Middlebox>,
}

impl Service {
    /// Position within the current batch. Contiguous and zero-based.
    pub fn id(&self) -> ServiceIdx {
        self.id
    }

    /// Position in the input arrival sequence.
    pub fn arrival_id(&self) -> usize {
        self.arrival_id
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn arrival(&self) -> Timeslot {
        self.arrival
    }

    pub fn deadline(&self) -> Option<Timeslot> {
        self.deadline
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn traffic_size(&self) -> u32 {
        self.traffic_size
    }

    pub fn middleboxes(&self) -> &[Middlebox] {
        &self.middleboxes
    }

    pub fn middlebox(&self, index: usize) -> &Middlebox {
        &self.middleboxes[index]
    }

    pub fn num_virtual_links(&self) -> usize {
        self.middleboxes.len().saturating_sub(1)
    }

    /// Slots needed to push the service's traffic over one virtual link.
    pub fn transmission_time(&self) -> Timeslot {
        if self.traffic_size == 0 {
            0
        } else {
            self.traffic_size.div_ceil(self.bandwidth.max(1))
        }
    }

    /// Slots spent processing, ignoring transmissions and waiting.
    pub fn total_processing_time(&self) -> Timeslot {
        self.middleboxes.iter().map(|m| m.processing_time).sum()
    }

    /// Copy of this service carrying a batch-local id.
    pub fn with_id(&self, id: ServiceIdx) -> Service {
        Service { id, ..self.clone() }
    }
}

#[derive(Default)]
pub struct ServiceBuilder {
    id: Option<ServiceIdx>,
    arrival_id: Option<usize>,
    external_id: Option<String>,
    arrival: Option<Timeslot>,
    deadline: Option<Timeslot>,
    bandwidth: Option<Bandwidth>,
    traffic_size: Option<u32>,
    middleboxes: Vec<Middlebox>,
}

impl ServiceBuilder {
    pub fn set_id(&mut self, id: impl Into<ServiceIdx>) -> &mut ServiceBuilder {
        self.id = Some(id.into());
        self
    }

    pub fn set_arrival_id(&mut self, arrival_id: usize) -> &mut ServiceBuilder {
        self.arrival_id = Some(arrival_id);
        self
    }

    pub fn set_external_id(&mut self, external_id: impl Into<String>) -> &mut ServiceBuilder {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn set_arrival(&mut self, arrival: Timeslot) -> &mut ServiceBuilder {
        self.arrival = Some(arrival);
        self
    }

    pub fn set_deadline(&mut self, deadline: Timeslot) -> &mut ServiceBuilder {
        self.deadline = Some(deadline);
        self
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) -> &mut ServiceBuilder {
        self.bandwidth = Some(bandwidth);
        self
    }

    pub fn set_traffic_size(&mut self, traffic_size: u32) -> &mut ServiceBuilder {
        self.traffic_size = Some(traffic_size);
        self
    }

    /// Appends a middlebox. Without an explicit seed, one is derived from the
    /// arrival id and the chain position.
    pub fn add_middlebox(
        &mut self,
        vnf_type: VnfType,
        processing_time: Timeslot,
        seed: Option<u64>,
    ) -> &mut ServiceBuilder {
        let position = self.middleboxes.len() as u64;
        let arrival_id = self.arrival_id.unwrap_or(0) as u64;
        let seed = seed.unwrap_or((arrival_id << 16) | position);
        self.middleboxes
            .push(Middlebox::new(vnf_type, processing_time, seed));
        self
    }

    pub fn build(self) -> Service {
        let arrival_id = self.arrival_id.unwrap_or(0);
        Service {
            id: self.id.unwrap_or_else(|| ServiceIdx::new(arrival_id)),
            arrival_id,
            external_id: self
                .external_id
                .unwrap_or_else(|| format!("service-{arrival_id}")),
            arrival: self.arrival.unwrap_or(0),
            deadline: self.deadline,
            bandwidth: self.bandwidth.unwrap_or(1),
            traffic_size: self.traffic_size.unwrap_or(0),
            middleboxes: self.middleboxes,
        }
    }
}
