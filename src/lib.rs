pub mod agent;
pub mod api;
pub mod cli;
pub mod client;
pub mod engine;
pub mod protocol;
pub mod storage;
pub mod workflow;
pub mod workflows;
