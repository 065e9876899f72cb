pub mod network;
pub mod service;
pub mod timeslot;
