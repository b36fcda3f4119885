pub mod registry_client;

pub use registry_client::{RegistryCallError, RegistryClient, RegistryHandle};
