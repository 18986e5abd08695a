#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod controller;
mod dispatch;
mod error;
mod metrics;
mod proxy_secret;
mod resource;
mod selector;
pub mod telemetry;

pub use config::Config;
pub use controller::run;
pub use error::{Error, Result};
pub use resource::{
    EphemeralRunner, EphemeralRunnerSet, EphemeralRunnerSetSpec, EphemeralRunnerSetStatus,
    EphemeralRunnerSpec, EphemeralRunnerStatus, ProxyConfig, ProxyServerConfig, RunnerPhase,
    RunnerTemplateSpec,
};
