pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod converge;
pub mod descriptor;
pub mod fingerprint;
pub mod merge;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
