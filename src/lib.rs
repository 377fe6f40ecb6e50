// Modelog - model service with durable train/predict event logs
// Library exports

pub mod config;
pub mod logging;
pub mod model;
pub mod server;
pub mod smoke;
