pub mod alerts;
pub mod config;
pub mod container;
pub mod databases;
pub mod discovery;
pub mod docker;
pub mod error;
pub mod restic;

pub use config::Config;
pub use docker::DockerManager;
pub use error::BackupError;
