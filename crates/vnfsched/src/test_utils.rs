use std::{fs::File, path::PathBuf};

use crate::{
    json::types::{Instance, JsonInstance},
    problem::{
        network::{Bandwidth, LinkIdx, Network, NetworkBuilder, ServerIdx, VnfIdx, VnfType},
        service::{Service, ServiceBuilder},
        timeslot::Timeslot,
    },
};

pub const FIREWALL: VnfType = VnfType::new(0);
pub const NAT: VnfType = VnfType::new(1);

pub struct TestNetwork {
    pub network: Network,
    pub servers: Vec<ServerIdx>,
    pub vnfs: Vec<VnfIdx>,
    pub links: Vec<LinkIdx>,
}

/// Two servers joined by one link; a firewall on `s0`, a NAT on `s1`.
pub fn two_server_network(capacity: Bandwidth) -> TestNetwork {
    let mut builder = NetworkBuilder::default();
    let s0 = builder.add_server("s0");
    let s1 = builder.add_server("s1");
    let firewall = builder.add_vnf_type("firewall");
    let nat = builder.add_vnf_type("nat");
    let f0 = builder.add_vnf("f0", firewall, s0);
    let f1 = builder.add_vnf("f1", nat, s1);
    let link = builder.add_link("l0", s0, s1, capacity);

    TestNetwork {
        network: builder.build(),
        servers: vec![s0, s1],
        vnfs: vec![f0, f1],
        links: vec![link],
    }
}

/// Firewall then NAT, arriving at slot 0.
pub fn two_stage_service(
    arrival_id: usize,
    bandwidth: Bandwidth,
    traffic_size: u32,
    (firewall_time, nat_time): (Timeslot, Timeslot),
) -> Service {
    let mut builder = ServiceBuilder::default();
    builder
        .set_id(arrival_id)
        .set_arrival_id(arrival_id)
        .set_bandwidth(bandwidth)
        .set_traffic_size(traffic_size)
        .add_middlebox(FIREWALL, firewall_time, None)
        .add_middlebox(NAT, nat_time, None);
    builder.build()
}

pub fn fixture_path(fixture: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(fixture)
}

pub fn instance_from_fixture(fixture: &str) -> Instance {
    let file = File::open(fixture_path(fixture)).unwrap();
    JsonInstance::from_reader(file)
        .unwrap()
        .build_problem()
        .unwrap()
}

#[test]
fn test_two_server_network_layout() {
    let TestNetwork {
        network,
        servers,
        vnfs,
        links,
    } = two_server_network(10);

    assert_eq!(network.vnf(vnfs[0]).vnf_type(), FIREWALL);
    assert_eq!(network.vnf(vnfs[1]).server(), servers[1]);
    assert_eq!(network.link(links[0]).endpoints(), (servers[0], servers[1]));
    assert_eq!(network.find_vnf_type("nat"), Some(NAT));
}

#[test]
fn test_fixture_instance_loads() {
    let instance = instance_from_fixture("instance.json");
    assert_eq!(instance.network.servers().len(), 3);
    assert_eq!(instance.services.len(), 4);
}
