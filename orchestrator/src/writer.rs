//! Builds the manifest a run leaves behind.

use frax_deploy_protocol::topology::Topology;
use frax_deploy_protocol::{Category, Environment, ManifestPath};
use tracing::debug;

use crate::errors::DeployError;
use crate::manifest::Manifest;
use crate::registry::AddressRegistry;
use crate::resolver::ResolvedSet;

pub struct ManifestWriter<'a> {
    topology: &'a Topology,
}

impl<'a> ManifestWriter<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self { topology }
    }

    /// Prior manifest with every resolved slot overwritten and every library
    /// key present. Without a prior, categories follow the standard layout.
    pub fn build(&self, resolved: &ResolvedSet, prior: Option<&Manifest>) -> Manifest {
        let mut manifest = prior.cloned().unwrap_or_default();
        for component in resolved.iter() {
            if let Some(descriptor) = self.topology.component(&component.name) {
                manifest.set(&descriptor.slot, component.address.as_str());
            }
        }
        for library in self.topology.libraries() {
            // Libraries are never redeployed; keep whatever was recorded.
            manifest.set_if_absent(&ManifestPath::entry(Category::Libraries, library.clone()), "");
        }
        if prior.is_none() {
            manifest.normalize_order();
        }
        manifest
    }

    /// Merge `manifest` into the stored one for `environment` and persist.
    pub fn write(
        &self,
        registry: &AddressRegistry,
        environment: Environment,
        manifest: &Manifest,
    ) -> Result<Manifest, DeployError> {
        let merged = registry.merge(environment, manifest)?;
        let written = registry.persist(environment, &merged)?;
        debug!(environment = %environment, written, "manifest written");
        Ok(merged)
    }
}
