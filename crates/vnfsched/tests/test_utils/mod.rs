use std::{fs::File, path::PathBuf};

use vnfsched::{
    json::types::{Instance, JsonInstance},
    problem::{
        network::{Bandwidth, Network, NetworkBuilder, VnfType},
        service::{Service, ServiceBuilder},
        timeslot::Timeslot,
    },
};

pub const FIREWALL: VnfType = VnfType::new(0);
pub const NAT: VnfType = VnfType::new(1);

//
//  s0 [firewall] ---- l0 (capacity) ---- s1 [nat]
//
pub fn create_two_server_network(capacity: Bandwidth) -> Network {
    let mut builder = NetworkBuilder::default();
    let s0 = builder.add_server("s0");
    let s1 = builder.add_server("s1");
    let firewall = builder.add_vnf_type("firewall");
    let nat = builder.add_vnf_type("nat");
    builder.add_vnf("f0", firewall, s0);
    builder.add_vnf("f1", nat, s1);
    builder.add_link("l0", s0, s1, capacity);
    builder.build()
}

pub fn create_chain_service(
    arrival_id: usize,
    arrival: Timeslot,
    bandwidth: Bandwidth,
    chain: &[(VnfType, Timeslot)],
) -> Service {
    let mut builder = ServiceBuilder::default();
    builder
        .set_id(arrival_id)
        .set_arrival_id(arrival_id)
        .set_arrival(arrival)
        .set_bandwidth(bandwidth)
        .set_traffic_size(2 * bandwidth);
    for &(vnf_type, processing_time) in chain {
        builder.add_middlebox(vnf_type, processing_time, None);
    }
    builder.build()
}

pub fn load_fixture(fixture: &str) -> Instance {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(fixture);
    let file = File::open(path).unwrap();
    JsonInstance::from_reader(file)
        .unwrap()
        .build_problem()
        .unwrap()
}
