use std::io::Read;

use fxhash::FxHashSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::InstanceError,
    problem::{
        network::{Bandwidth, Network, NetworkBuilder},
        service::{Service, ServiceBuilder},
        timeslot::Timeslot,
    },
};

/// A network plus the services arriving on it.
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename = "Instance")]
pub struct JsonInstance {
    pub id: Option<String>,
    pub vnf_types: Vec<String>,
    pub servers: Vec<JsonServer>,
    pub vnfs: Vec<JsonVnf>,
    pub links: Vec<JsonLink>,
    pub services: Vec<JsonService>,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename = "Server")]
pub struct JsonServer {
    pub id: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename = "Vnf")]
pub struct JsonVnf {
    pub id: String,
    pub vnf_type: String,
    pub server: String,
}

/// Undirected link between two servers.
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename = "Link")]
pub struct JsonLink {
    pub id: String,
    pub endpoints: [String; 2],
    pub capacity: Bandwidth,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename = "Service")]
pub struct JsonService {
    pub id: String,
    pub arrival: Timeslot,
    pub deadline: Option<Timeslot>,
    pub bandwidth: Bandwidth,
    #[serde(default)]
    pub traffic_size: u32,
    pub middleboxes: Vec<JsonMiddlebox>,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename = "Middlebox")]
pub struct JsonMiddlebox {
    pub vnf_type: String,
    pub processing_time: Timeslot,
    pub seed: Option<u64>,
}

pub struct Instance {
    pub network: Network,
    /// In input order; `arrival_id` is the input position.
    pub services: Vec<Service>,
}

impl JsonInstance {
    pub fn from_reader(reader: impl Read) -> Result<Self, InstanceError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json(json: &str) -> Result<Self, InstanceError> {
        Ok(serde_json::from_str(json)?)
    }

    #[instrument(skip_all, level = "debug")]
    pub fn build_problem(&self) -> Result<Instance, InstanceError> {
        let mut builder = NetworkBuilder::default();

        let mut types = FxHashSet::default();
        for name in &self.vnf_types {
            types.insert(name.as_str());
            builder.add_vnf_type(name.as_str());
        }

        for server in &self.servers {
            if builder.server_by_id(&server.id).is_some() {
                return Err(InstanceError::DuplicateServer(server.id.clone()));
            }
            builder.add_server(server.id.as_str());
        }

        for vnf in &self.vnfs {
            if !types.contains(vnf.vnf_type.as_str()) {
                return Err(InstanceError::UnknownVnfType {
                    owner: vnf.id.clone(),
                    vnf_type: vnf.vnf_type.clone(),
                });
            }
            let server = builder
                .server_by_id(&vnf.server)
                .ok_or_else(|| InstanceError::UnknownServer(vnf.server.clone()))?;
            let vnf_type = builder.add_vnf_type(vnf.vnf_type.as_str());
            builder.add_vnf(vnf.id.as_str(), vnf_type, server);
        }

        for link in &self.links {
            let [a, b] = &link.endpoints;
            let from = builder
                .server_by_id(a)
                .ok_or_else(|| InstanceError::UnknownServer(a.clone()))?;
            let to = builder
                .server_by_id(b)
                .ok_or_else(|| InstanceError::UnknownServer(b.clone()))?;
            if from == to {
                return Err(InstanceError::SelfLoop {
                    link: link.id.clone(),
                    server: a.clone(),
                });
            }
            if link.capacity == 0 {
                return Err(InstanceError::ZeroCapacity(link.id.clone()));
            }
            builder.add_link(link.id.as_str(), from, to, link.capacity);
        }

        let mut services = Vec::with_capacity(self.services.len());
        for (arrival_id, service) in self.services.iter().enumerate() {
            if service.middleboxes.is_empty() {
                return Err(InstanceError::EmptyChain(service.id.clone()));
            }
            if service.bandwidth == 0 {
                return Err(InstanceError::ZeroBandwidth(service.id.clone()));
            }
            if let Some(deadline) = service.deadline
                && deadline < service.arrival
            {
                return Err(InstanceError::DeadlineBeforeArrival {
                    service: service.id.clone(),
                    arrival: service.arrival,
                    deadline,
                });
            }

            let mut service_builder = ServiceBuilder::default();
            service_builder
                .set_id(arrival_id)
                .set_arrival_id(arrival_id)
                .set_external_id(service.id.as_str())
                .set_arrival(service.arrival)
                .set_bandwidth(service.bandwidth)
                .set_traffic_size(service.traffic_size);
            if let Some(deadline) = service.deadline {
                service_builder.set_deadline(deadline);
            }

            for middlebox in &service.middleboxes {
                if !types.contains(middlebox.vnf_type.as_str()) {
                    return Err(InstanceError::UnknownVnfType {
                        owner: service.id.clone(),
                        vnf_type: middlebox.vnf_type.clone(),
                    });
                }
                let vnf_type = builder.add_vnf_type(middlebox.vnf_type.as_str());
                service_builder.add_middlebox(vnf_type, middlebox.processing_time, middlebox.seed);
            }

            services.push(service_builder.build());
        }

        Ok(Instance {
            network: builder.build(),
            services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE: &str = r#"{
        "vnf_types": ["firewall", "nat"],
        "servers": [{ "id": "a" }, { "id": "b" }],
        "vnfs": [
            { "id": "fw", "vnf_type": "firewall", "server": "a" },
            { "id": "nat", "vnf_type": "nat", "server": "b" }
        ],
        "links": [{ "id": "ab", "endpoints": ["a", "b"], "capacity": 10 }],
        "services": [
            {
                "id": "web",
                "arrival": 3,
                "deadline": 20,
                "bandwidth": 5,
                "traffic_size": 10,
                "middleboxes": [
                    { "vnf_type": "firewall", "processing_time": 2 },
                    { "vnf_type": "nat", "processing_time": 1, "seed": 42 }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_build_problem() {
        let instance = JsonInstance::from_json(INSTANCE)
            .unwrap()
            .build_problem()
            .unwrap();

        assert_eq!(instance.network.servers().len(), 2);
        assert_eq!(instance.network.num_vnfs(), 2);
        assert_eq!(instance.network.links()[0].capacity(), 10);

        let service = &instance.services[0];
        assert_eq!(service.external_id(), "web");
        assert_eq!(service.arrival(), 3);
        assert_eq!(service.deadline(), Some(20));
        assert_eq!(service.transmission_time(), 2);
        assert_eq!(service.middlebox(1).seed(), 42);
        assert_eq!(
            instance
                .network
                .vnf_type_name(service.middlebox(0).vnf_type()),
            "firewall"
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let json = INSTANCE.replace("\"capacity\": 10", "\"capacity\": 10, \"latency\": 3");
        assert!(matches!(
            JsonInstance::from_json(&json),
            Err(InstanceError::Json(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_references() {
        let json = INSTANCE.replace("\"server\": \"b\"", "\"server\": \"c\"");
        let result = JsonInstance::from_json(&json).unwrap().build_problem();
        assert!(matches!(result, Err(InstanceError::UnknownServer(server)) if server == "c"));

        let json = INSTANCE.replace(
            "{ \"vnf_type\": \"nat\", \"processing_time\": 1",
            "{ \"vnf_type\": \"dpi\", \"processing_time\": 1",
        );
        let result = JsonInstance::from_json(&json).unwrap().build_problem();
        assert!(matches!(
            result,
            Err(InstanceError::UnknownVnfType { vnf_type, .. }) if vnf_type == "dpi"
        ));
    }
}
