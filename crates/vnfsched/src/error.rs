use thiserror::Error;

use crate::problem::{
    network::{Bandwidth, VnfType},
    service::ServiceIdx,
    timeslot::Timeslot,
};

/// Why the heuristic constructor could not produce a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("service {service}: empty middlebox chain")]
    EmptyChain { service: ServiceIdx },

    #[error("service {service}: no VNF instance of type {vnf_type} for middlebox {middlebox}")]
    NoCapableVnf {
        service: ServiceIdx,
        middlebox: usize,
        vnf_type: VnfType,
    },

    #[error(
        "service {service}: no route with {bandwidth} bandwidth available for virtual link {link}"
    )]
    NoFeasibleRoute {
        service: ServiceIdx,
        link: usize,
        bandwidth: Bandwidth,
    },

    #[error("service {service}: completion time {completion_time} exceeds horizon {horizon}")]
    HorizonExceeded {
        service: ServiceIdx,
        completion_time: Timeslot,
        horizon: Timeslot,
    },
}

/// The LP backend failed for a reason other than infeasibility.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver backend error: {0}")]
    Backend(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("batch has no services")]
    EmptyBatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    #[error("unknown server `{0}`")]
    UnknownServer(String),

    #[error("duplicate server `{0}`")]
    DuplicateServer(String),

    #[error("link `{link}` joins server `{server}` to itself")]
    SelfLoop { link: String, server: String },

    #[error("link `{0}` has zero capacity")]
    ZeroCapacity(String),

    #[error("`{owner}` references undeclared VNF type `{vnf_type}`")]
    UnknownVnfType { owner: String, vnf_type: String },

    #[error("service `{0}` has an empty middlebox chain")]
    EmptyChain(String),

    #[error("service `{0}` requests zero bandwidth")]
    ZeroBandwidth(String),

    #[error("service `{service}` has deadline {deadline} before its arrival {arrival}")]
    DeadlineBeforeArrival {
        service: String,
        arrival: Timeslot,
        deadline: Timeslot,
    },

    #[error(transparent)]
    Json(#[from] JsonError),
}

/// `serde_json::Error` is neither `Clone` nor `PartialEq`; keep its message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct JsonError(pub String);

impl From<serde_json::Error> for InstanceError {
    fn from(error: serde_json::Error) -> Self {
        InstanceError::Json(JsonError(error.to_string()))
    }
}
