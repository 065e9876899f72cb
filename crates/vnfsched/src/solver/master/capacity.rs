use std::sync::Arc;

use serde::Serialize;

use crate::problem::{
    network::{Bandwidth, LinkIdx, Network, VnfIdx},
    timeslot::Timeslot,
};
use crate::solver::configuration::Configuration;

/// Capacity left for one batch after blocking everything before its start and
/// subtracting what earlier batches committed.
#[derive(Debug, Clone)]
pub struct ResidualCapacity {
    horizon: Timeslot,
    start: Timeslot,
    vnf: Vec<u8>,
    link: Vec<Bandwidth>,
}

impl ResidualCapacity {
    pub fn new(
        network: &Network,
        horizon: Timeslot,
        start: Timeslot,
        prior: &[Arc<Configuration>],
    ) -> Self {
        let width = horizon as usize;
        let mut vnf = vec![1u8; network.num_vnfs() * width];
        let mut link: Vec<Bandwidth> = network
            .links()
            .iter()
            .flat_map(|link| std::iter::repeat_n(link.capacity(), width))
            .collect();

        for configuration in prior {
            for (f, slot) in configuration.occupied_vnf_slots() {
                if slot < horizon {
                    let cell = &mut vnf[f.get() * width + slot as usize];
                    *cell = cell.saturating_sub(1);
                }
            }
            for (l, slot, bandwidth) in configuration.occupied_link_slots() {
                if slot < horizon {
                    let cell = &mut link[l.get() * width + slot as usize];
                    *cell = cell.saturating_sub(bandwidth);
                }
            }
        }

        let blocked = start.min(horizon) as usize;
        for row in vnf.chunks_mut(width.max(1)) {
            let blocked = blocked.min(row.len());
            row[..blocked].fill(0);
        }
        for row in link.chunks_mut(width.max(1)) {
            let blocked = blocked.min(row.len());
            row[..blocked].fill(0);
        }

        ResidualCapacity {
            horizon,
            start,
            vnf,
            link,
        }
    }

    pub fn horizon(&self) -> Timeslot {
        self.horizon
    }

    pub fn start(&self) -> Timeslot {
        self.start
    }

    /// Either 0 or 1.
    pub fn vnf(&self, vnf: VnfIdx, slot: Timeslot) -> u8 {
        self.vnf[vnf.get() * self.horizon as usize + slot as usize]
    }

    pub fn vnf_available(&self, vnf: VnfIdx, slot: Timeslot) -> bool {
        slot < self.horizon && self.vnf(vnf, slot) > 0
    }

    pub fn link(&self, link: LinkIdx, slot: Timeslot) -> Bandwidth {
        self.link[link.get() * self.horizon as usize + slot as usize]
    }

    pub fn link_available(&self, link: LinkIdx, slot: Timeslot, bandwidth: Bandwidth) -> bool {
        slot < self.horizon && self.link(link, slot) >= bandwidth
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CapacityViolation {
    BeforeStart {
        slot: Timeslot,
    },
    Vnf {
        vnf: VnfIdx,
        slot: Timeslot,
        usage: u32,
    },
    Link {
        link: LinkIdx,
        slot: Timeslot,
        usage: Bandwidth,
        residual: Bandwidth,
    },
}

/// Checks that `configurations` fit alongside `prior` without using anything
/// before `start`. Returns every violation found.
pub fn verify_capacity(
    configurations: &[Arc<Configuration>],
    prior: &[Arc<Configuration>],
    network: &Network,
    start: Timeslot,
) -> Vec<CapacityViolation> {
    let horizon = configurations
        .iter()
        .chain(prior)
        .map(|configuration| configuration.horizon())
        .max()
        .unwrap_or(0);
    let width = horizon as usize;

    let mut prior_vnf = vec![0u32; network.num_vnfs() * width];
    let mut prior_link = vec![0 as Bandwidth; network.num_links() * width];
    for configuration in prior {
        for (f, slot) in configuration.occupied_vnf_slots() {
            prior_vnf[f.get() * width + slot as usize] += 1;
        }
        for (l, slot, bandwidth) in configuration.occupied_link_slots() {
            prior_link[l.get() * width + slot as usize] += bandwidth;
        }
    }

    let mut vnf_usage = vec![0u32; network.num_vnfs() * width];
    let mut link_usage = vec![0 as Bandwidth; network.num_links() * width];
    let mut violations = vec![];

    for configuration in configurations {
        for (f, slot) in configuration.occupied_vnf_slots() {
            if slot < start {
                violations.push(CapacityViolation::BeforeStart { slot });
            }
            vnf_usage[f.get() * width + slot as usize] += 1;
        }
        for (l, slot, bandwidth) in configuration.occupied_link_slots() {
            if slot < start {
                violations.push(CapacityViolation::BeforeStart { slot });
            }
            link_usage[l.get() * width + slot as usize] += bandwidth;
        }
    }

    for (index, &usage) in vnf_usage.iter().enumerate() {
        if usage + prior_vnf[index] > 1 {
            violations.push(CapacityViolation::Vnf {
                vnf: VnfIdx::new(index / width),
                slot: (index % width) as Timeslot,
                usage,
            });
        }
    }

    for (index, &usage) in link_usage.iter().enumerate() {
        let link = LinkIdx::new(index / width);
        let residual = network
            .link(link)
            .capacity()
            .saturating_sub(prior_link[index]);
        if usage > residual {
            violations.push(CapacityViolation::Link {
                link,
                slot: (index % width) as Timeslot,
                usage,
                residual,
            });
        }
    }

    violations
}
