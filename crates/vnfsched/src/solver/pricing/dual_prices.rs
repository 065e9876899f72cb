use crate::{
    problem::{
        network::{LinkIdx, VnfIdx},
        service::ServiceIdx,
        timeslot::Timeslot,
    },
    solver::configuration::Configuration,
};

/// Read-only snapshot of the master duals, already turned into pricing
/// weights.
///
/// Resource prices and the makespan weight are clamped at zero; the admission
/// dual is kept as is.
#[derive(Debug, Clone, PartialEq)]
pub struct DualPrices {
    horizon: Timeslot,
    admission: Vec<f64>,
    makespan: Vec<f64>,
    vnf: Vec<f64>,
    link: Vec<f64>,
}

impl DualPrices {
    /// `vnf` and `link` are the raw row duals of the capacity rows laid out
    /// resource-major over `horizon` slots.
    pub fn from_row_duals(
        horizon: Timeslot,
        admission: Vec<f64>,
        makespan: &[f64],
        vnf: &[f64],
        link: &[f64],
    ) -> Self {
        DualPrices {
            horizon,
            admission,
            makespan: makespan.iter().map(|dual| dual.max(0.0)).collect(),
            vnf: vnf.iter().map(|dual| (-dual).max(0.0)).collect(),
            link: link.iter().map(|dual| (-dual).max(0.0)).collect(),
        }
    }

    /// Prices where nothing is scarce and every service is worth `admission`.
    pub fn uniform(
        horizon: Timeslot,
        num_services: usize,
        num_vnfs: usize,
        num_links: usize,
        admission: f64,
        makespan: f64,
    ) -> Self {
        let width = horizon as usize;
        DualPrices {
            horizon,
            admission: vec![admission; num_services],
            makespan: vec![makespan; num_services],
            vnf: vec![0.0; num_vnfs * width],
            link: vec![0.0; num_links * width],
        }
    }

    pub fn horizon(&self) -> Timeslot {
        self.horizon
    }

    /// `pi`, the value of admitting one more column of the service.
    pub fn admission(&self, service: ServiceIdx) -> f64 {
        self.admission[service.get()]
    }

    /// `sigma`, the weight on the service's completion time.
    pub fn makespan(&self, service: ServiceIdx) -> f64 {
        self.makespan[service.get()]
    }

    pub fn vnf(&self, vnf: VnfIdx, slot: Timeslot) -> f64 {
        self.vnf[vnf.get() * self.horizon as usize + slot as usize]
    }

    /// Price per unit of bandwidth.
    pub fn link(&self, link: LinkIdx, slot: Timeslot) -> f64 {
        self.link[link.get() * self.horizon as usize + slot as usize]
    }

    pub fn set_vnf(&mut self, vnf: VnfIdx, slot: Timeslot, price: f64) {
        self.vnf[vnf.get() * self.horizon as usize + slot as usize] = price;
    }

    pub fn set_link(&mut self, link: LinkIdx, slot: Timeslot, price: f64) {
        self.link[link.get() * self.horizon as usize + slot as usize] = price;
    }

    /// Dual cost of a column: completion weight plus resource prices.
    pub fn cost(&self, configuration: &Configuration) -> f64 {
        let service = configuration.service();
        let vnf: f64 = configuration
            .occupied_vnf_slots()
            .filter(|&(_, slot)| slot < self.horizon)
            .map(|(f, slot)| self.vnf(f, slot))
            .sum();
        let link: f64 = configuration
            .occupied_link_slots()
            .filter(|&(_, slot, _)| slot < self.horizon)
            .map(|(l, slot, bandwidth)| self.link(l, slot) * bandwidth as f64)
            .sum();

        self.makespan(service) * configuration.completion_time() as f64 + vnf + link
    }

    /// `pi - cost`; positive when adding the column would improve the LP.
    pub fn value(&self, configuration: &Configuration) -> f64 {
        self.admission(configuration.service()) - self.cost(configuration)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        solver::heuristic::construct_configuration,
        test_utils::{self, TestNetwork},
    };

    use super::*;

    #[test]
    fn test_from_row_duals_flips_capacity_signs() {
        let prices = DualPrices::from_row_duals(2, vec![7.0], &[1.0], &[-0.5, 0.25], &[0.0, -2.0]);

        assert_eq!(prices.admission(ServiceIdx::new(0)), 7.0);
        assert_eq!(prices.makespan(ServiceIdx::new(0)), 1.0);
        assert_eq!(prices.vnf(VnfIdx::new(0), 0), 0.5);
        assert_eq!(prices.vnf(VnfIdx::new(0), 1), 0.0);
        assert_eq!(prices.link(LinkIdx::new(0), 1), 2.0);
    }

    #[test]
    fn test_value_of_configuration() {
        let TestNetwork { network, .. } = test_utils::two_server_network(10);
        let service = test_utils::two_stage_service(0, 5, 10, (2, 3));
        // f0 [0,2), link [2,4), f1 [4,7)
        let configuration = construct_configuration(&service, &network, 10, 0).unwrap();

        let mut prices = DualPrices::uniform(10, 1, 2, 1, 10.0, 1.0);
        assert_eq!(prices.value(&configuration), 3.0);

        prices.set_vnf(VnfIdx::new(1), 5, 0.5);
        prices.set_link(LinkIdx::new(0), 3, 0.1);
        assert!((prices.value(&configuration) - 2.0).abs() < 1e-12);
    }
}
