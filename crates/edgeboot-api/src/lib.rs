// edgeboot-api: outbound HTTP for the edgeboot orchestrator

pub mod download;
pub mod error;
pub mod geo;
pub mod registry;
pub mod transport;

pub use download::Downloader;
pub use error::Error;
pub use geo::{GeoInfo, GeoLocator, GeoProvider};
pub use registry::RegistryClient;
pub use transport::{RedirectMode, TransportConfig};
