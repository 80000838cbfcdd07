//! Sarabi deploys multi-component applications — backend service, static
//! frontend, managed databases behind a shared reverse proxy — onto a single
//! host, with versioned rollouts, rollback, scaling, variable updates and
//! teardown.
//!
//! The crate is the orchestration engine only. External systems are consumed
//! through capability traits: the container runtime
//! ([`runtime::ContainerRuntime`]), the reverse-proxy admin API
//! ([`proxy::ProxyAdmin`], with [`proxy::CaddyClient`] as the HTTP
//! implementation) and the host firewall ([`firewall::Firewall`]).

pub mod artifact;
pub mod builders;
pub mod config;
pub mod error;
pub mod firewall;
pub mod ids;
pub mod model;
pub mod orchestrator;
pub mod proxy;
pub mod registry;
pub mod runtime;
pub mod telemetry;
pub mod vault;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
