//! Turns component descriptors into concrete addresses.

use std::collections::HashMap;
use std::fmt;

use frax_deploy_protocol::topology::{methods, ArgSpec, ComponentDescriptor, Provision};
use frax_deploy_protocol::{ActorRole, Address, Ledger, LedgerError, ResolutionMode, Value};
use tracing::debug;

use crate::config::Actors;
use crate::errors::{DeployError, TopologyError};
use crate::manifest::Manifest;

/// How a component's address was obtained in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Instantiated by this run
    Deployed,
    /// Read from the manifest
    Attached,
    /// Pair already known to the factory
    Discovered,
    /// Pair created by this run
    Created,
}

impl Origin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Origin::Deployed => "deployed",
            Origin::Attached => "attached",
            Origin::Discovered => "discovered",
            Origin::Created => "created",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedComponent {
    pub name: String,
    pub address: Address,
    pub origin: Origin,
}

/// Components resolved so far, in resolution order. Entries are never
/// replaced.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSet {
    components: Vec<ResolvedComponent>,
    index: HashMap<String, usize>,
}

impl ResolvedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: ResolvedComponent) -> Result<(), TopologyError> {
        if self.index.contains_key(&component.name) {
            return Err(TopologyError::DuplicateComponent {
                name: component.name,
            });
        }
        self.index.insert(component.name.clone(), self.components.len());
        self.components.push(component);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedComponent> {
        self.index.get(name).map(|&position| &self.components[position])
    }

    pub fn address(&self, name: &str) -> Option<&Address> {
        self.get(name).map(|component| &component.address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedComponent> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Address of the already-resolved component `dependency`, needed by `node`.
pub fn resolved_address<'r>(
    node: &str,
    dependency: &str,
    resolved: &'r ResolvedSet,
) -> Result<&'r Address, DeployError> {
    resolved.address(dependency).ok_or_else(|| {
        TopologyError::Unresolved {
            node: node.to_string(),
            dependency: dependency.to_string(),
        }
        .into()
    })
}

/// Address recorded for `descriptor` in the manifest. Absent or empty is
/// `MissingAddress`; unparsable or zero is `InvalidAddress`.
pub fn recorded_address(
    manifest: Option<&Manifest>,
    descriptor: &ComponentDescriptor,
) -> Result<Address, DeployError> {
    let text = manifest
        .and_then(|manifest| manifest.get(&descriptor.slot))
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| DeployError::MissingAddress {
            component: descriptor.name.clone(),
            path: descriptor.slot.clone(),
        })?;
    match Address::parse(text) {
        Ok(address) if !address.is_zero() => Ok(address),
        _ => Err(DeployError::InvalidAddress {
            component: descriptor.name.clone(),
            value: text.to_string(),
        }),
    }
}

/// Bind argument specs to concrete values for `node`.
pub fn bind_args(
    node: &str,
    specs: &[ArgSpec],
    actors: &Actors,
    resolved: &ResolvedSet,
) -> Result<Vec<Value>, DeployError> {
    specs
        .iter()
        .map(|spec| match spec {
            ArgSpec::Component(name) => Ok(Value::Address(resolved_address(node, name, resolved)?.clone())),
            ArgSpec::Actor(role) => Ok(Value::Address(actors.get(*role)?.clone())),
            ArgSpec::Uint(amount) => Ok(Value::Uint(*amount)),
            ArgSpec::Text(text) => Ok(Value::Text(text.clone())),
        })
        .collect()
}

/// Resolves one component at a time against the ledger and, in attach mode,
/// the prior manifest. Never writes the registry.
pub struct Resolver<'a, L: Ledger> {
    ledger: &'a mut L,
    actors: &'a Actors,
    manifest: Option<&'a Manifest>,
}

impl<'a, L: Ledger> Resolver<'a, L> {
    pub fn new(ledger: &'a mut L, actors: &'a Actors, manifest: Option<&'a Manifest>) -> Self {
        Self {
            ledger,
            actors,
            manifest,
        }
    }

    pub fn resolve(
        &mut self,
        descriptor: &ComponentDescriptor,
        resolved: &ResolvedSet,
        mode: ResolutionMode,
    ) -> Result<ResolvedComponent, DeployError> {
        let (address, origin) = match (&descriptor.provision, mode) {
            (Provision::Deploy { artifact, actor, args }, ResolutionMode::Fresh) => {
                let args = bind_args(&descriptor.name, args, self.actors, resolved)?;
                let actor = self.actors.get(*actor)?.clone();
                (self.instantiate(descriptor, artifact, &args, &actor)?, Origin::Deployed)
            }
            (Provision::Deploy { .. }, ResolutionMode::Attach) => {
                (recorded_address(self.manifest, descriptor)?, Origin::Attached)
            }
            (
                Provision::Pair {
                    factory,
                    token_a,
                    token_b,
                    creator,
                },
                mode,
            ) => {
                // A pair over a component deployed in this run cannot exist yet.
                let mode = if descriptor
                    .construction_deps()
                    .into_iter()
                    .any(|name| resolved.get(name).map(|c| c.origin) == Some(Origin::Deployed))
                {
                    ResolutionMode::Fresh
                } else {
                    mode
                };
                let factory = resolved_address(&descriptor.name, factory, resolved)?;
                let pair = [
                    Value::Address(resolved_address(&descriptor.name, token_a, resolved)?.clone()),
                    Value::Address(resolved_address(&descriptor.name, token_b, resolved)?.clone()),
                ];
                self.pair(descriptor, factory, &pair, *creator, mode)?
            }
        };
        Ok(ResolvedComponent {
            name: descriptor.name.clone(),
            address,
            origin,
        })
    }

    fn instantiate(
        &mut self,
        descriptor: &ComponentDescriptor,
        artifact: &str,
        args: &[Value],
        actor: &Address,
    ) -> Result<Address, DeployError> {
        debug!(component = %descriptor.name, artifact, actor = %actor, "instantiating");
        let address = self
            .ledger
            .instantiate(artifact, args, actor)
            .map_err(|source| deployment(descriptor, source))?;
        if address.is_zero() {
            return Err(deployment(
                descriptor,
                LedgerError::Decode("instantiation returned the zero address".to_string()),
            ));
        }
        Ok(address)
    }

    fn pair(
        &mut self,
        descriptor: &ComponentDescriptor,
        factory: &Address,
        tokens: &[Value; 2],
        creator: ActorRole,
        mode: ResolutionMode,
    ) -> Result<(Address, Origin), DeployError> {
        let existing = self.lookup_pair(descriptor, factory, tokens)?;
        if !existing.is_zero() {
            return Ok((existing, Origin::Discovered));
        }
        if mode == ResolutionMode::Attach {
            return Err(DeployError::PairNotFound {
                component: descriptor.name.clone(),
            });
        }

        let creator = self.actors.get(creator)?;
        debug!(component = %descriptor.name, factory = %factory, "creating pair");
        self.ledger
            .call(factory, methods::CREATE_PAIR, tokens, creator)
            .map_err(|source| deployment(descriptor, source))?;
        let created = self.lookup_pair(descriptor, factory, tokens)?;
        if created.is_zero() {
            return Err(deployment(
                descriptor,
                LedgerError::Decode("factory has no pair after createPair".to_string()),
            ));
        }
        Ok((created, Origin::Created))
    }

    fn lookup_pair(
        &self,
        descriptor: &ComponentDescriptor,
        factory: &Address,
        tokens: &[Value; 2],
    ) -> Result<Address, DeployError> {
        let value = self
            .ledger
            .read(factory, methods::GET_PAIR, tokens)
            .map_err(|source| deployment(descriptor, source))?;
        value.as_address().cloned().ok_or_else(|| {
            deployment(
                descriptor,
                LedgerError::Decode(format!("getPair returned `{}`", value)),
            )
        })
    }
}

fn deployment(descriptor: &ComponentDescriptor, source: LedgerError) -> DeployError {
    DeployError::Deployment {
        component: descriptor.name.clone(),
        source,
    }
}
