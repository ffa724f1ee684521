//! Ordering of components and wiring steps.
//!
//! Both orders come from the same Kahn's-algorithm pass over explicit
//! dependency edges. Among ready nodes the lowest `(rank, declaration index)`
//! goes first, so the result is deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use frax_deploy_protocol::topology::{ComponentDescriptor, Topology, WiringStep};

use crate::errors::TopologyError;

struct DependencyGraph<'a> {
    names: Vec<&'a str>,
    deps: Vec<Vec<usize>>,
    rank: Vec<usize>,
}

impl<'a> DependencyGraph<'a> {
    fn sort(&self) -> Result<Vec<usize>, TopologyError> {
        let count = self.names.len();
        let mut pending: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); count];
        for (node, deps) in self.deps.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..count)
            .filter(|&node| pending[node] == 0)
            .map(|node| Reverse((self.rank[node], node)))
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node);
            for &dependent in &dependents[node] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse((self.rank[dependent], dependent)));
                }
            }
        }

        if order.len() == count {
            Ok(order)
        } else {
            Err(TopologyError::Cycle {
                members: self.find_cycle(&pending),
            })
        }
    }

    /// Walk unsatisfied edges from the first stuck node until a node repeats.
    fn find_cycle(&self, pending: &[usize]) -> Vec<String> {
        let Some(start) = (0..self.names.len()).find(|&node| pending[node] > 0) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(&next) = self.deps[current].iter().find(|&&dep| pending[dep] > 0) else {
                break;
            };
            if let Some(position) = path.iter().position(|&node| node == next) {
                let mut members: Vec<String> =
                    path[position..].iter().map(|&node| self.names[node].to_string()).collect();
                members.push(self.names[next].to_string());
                return members;
            }
            path.push(next);
            current = next;
        }
        path.iter().map(|&node| self.names[node].to_string()).collect()
    }
}

fn index_components(topology: &Topology) -> Result<HashMap<&str, usize>, TopologyError> {
    let mut index = HashMap::with_capacity(topology.components().len());
    for (position, component) in topology.components().iter().enumerate() {
        if index.insert(component.name.as_str(), position).is_some() {
            return Err(TopologyError::DuplicateComponent {
                name: component.name.clone(),
            });
        }
    }
    Ok(index)
}

/// Components ordered so every dependency comes before its dependents.
pub fn resolution_order(topology: &Topology) -> Result<Vec<&ComponentDescriptor>, TopologyError> {
    let components = topology.components();
    let index = index_components(topology)?;

    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(components.len());
    for component in components {
        if let Some(missing) = component
            .dependencies()
            .into_iter()
            .find(|name| !index.contains_key(name))
        {
            return Err(TopologyError::UnknownDependency {
                node: component.name.clone(),
                dependency: missing.to_string(),
            });
        }
        // Wiring dependencies only order the wiring steps.
        deps.push(
            component
                .construction_deps()
                .into_iter()
                .map(|name| index[name])
                .collect(),
        );
    }

    let graph = DependencyGraph {
        names: components.iter().map(|c| c.name.as_str()).collect(),
        deps,
        rank: vec![0; components.len()],
    };
    Ok(graph
        .sort()?
        .into_iter()
        .map(|node| &components[node])
        .collect())
}

/// Wiring steps ordered phase by phase, declaration order within a phase.
/// A step whose target waits on another component's wiring is placed after
/// that wiring; one that would have to run before its own phase is a cycle.
pub fn wiring_order(topology: &Topology) -> Result<Vec<&WiringStep>, TopologyError> {
    let steps = topology.wiring();
    let components = index_components(topology)?;

    let mut ids = HashMap::with_capacity(steps.len());
    for step in steps {
        if ids.insert(step.id.as_str(), ()).is_some() {
            return Err(TopologyError::DuplicateStep {
                id: step.id.clone(),
            });
        }
        if let Some(missing) = step
            .components()
            .into_iter()
            .find(|name| !components.contains_key(name))
        {
            return Err(TopologyError::UnknownDependency {
                node: step.id.clone(),
                dependency: missing.to_string(),
            });
        }
    }

    // A step runs after every step of an earlier phase and after every step
    // targeting a wiring dependency of its own target.
    let deps: Vec<Vec<usize>> = steps
        .iter()
        .map(|step| {
            let wiring_deps = topology
                .component(&step.target)
                .map(|target| target.wiring_deps.as_slice())
                .unwrap_or_default();
            steps
                .iter()
                .enumerate()
                .filter(|(_, other)| {
                    other.phase < step.phase || wiring_deps.contains(&other.target)
                })
                .map(|(position, _)| position)
                .collect()
        })
        .collect();

    let graph = DependencyGraph {
        names: steps.iter().map(|s| s.id.as_str()).collect(),
        deps,
        rank: steps.iter().map(|s| s.phase as usize).collect(),
    };
    Ok(graph.sort()?.into_iter().map(|node| &steps[node]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frax_deploy_protocol::topology::{
        self, ArgSpec, Expectation, Probe, ProtocolPlan, Provision, WiringPhase,
    };
    use frax_deploy_protocol::{ActorRole, Category, ComponentKind, ManifestPath};
    use pretty_assertions::assert_eq;

    fn node(name: &str, deps: &[&str]) -> ComponentDescriptor {
        ComponentDescriptor {
            name: name.to_string(),
            kind: ComponentKind::Utility,
            slot: ManifestPath::entry(Category::Misc, name),
            provision: Provision::Deploy {
                artifact: name.to_string(),
                actor: ActorRole::CollateralOwner,
                args: deps.iter().map(|d| ArgSpec::component(*d)).collect(),
            },
            wiring_deps: Vec::new(),
        }
    }

    fn step(id: &str, phase: WiringPhase, target: &str) -> WiringStep {
        WiringStep {
            id: id.to_string(),
            phase,
            actor: ActorRole::CollateralOwner,
            target: target.to_string(),
            method: "poke()".to_string(),
            args: Vec::new(),
            probe: Probe {
                method: "poked()".to_string(),
                args: Vec::new(),
                expect: Expectation::True,
            },
            after: Vec::new(),
        }
    }

    fn names(order: &[&ComponentDescriptor]) -> Vec<String> {
        order.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_dependencies_first_then_declaration_order() {
        let topology = Topology::new(
            vec![node("c", &["b"]), node("a", &[]), node("b", &["a"]), node("d", &[])],
            Vec::new(),
            Vec::new(),
        );
        let order = resolution_order(&topology).unwrap();
        assert_eq!(names(&order), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_names_members() {
        let topology = Topology::new(
            vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"]), node("d", &[])],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(
            resolution_order(&topology).unwrap_err(),
            TopologyError::Cycle {
                members: vec!["a".into(), "c".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let topology = Topology::new(vec![node("a", &["ghost"])], Vec::new(), Vec::new());
        assert_eq!(
            resolution_order(&topology).unwrap_err(),
            TopologyError::UnknownDependency {
                node: "a".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn test_duplicate_component() {
        let topology = Topology::new(vec![node("a", &[]), node("a", &[])], Vec::new(), Vec::new());
        assert_eq!(
            resolution_order(&topology).unwrap_err(),
            TopologyError::DuplicateComponent { name: "a".into() }
        );
    }

    #[test]
    fn test_wiring_phases_override_declaration_order() {
        let topology = Topology::new(
            vec![node("token", &[]), node("pool", &[])],
            vec![
                step("activate", WiringPhase::StakingActivation, "token"),
                step("link", WiringPhase::TokenLinkage, "token"),
                step("register_b", WiringPhase::PoolRegistration, "pool"),
                step("register_a", WiringPhase::PoolRegistration, "token"),
            ],
            Vec::new(),
        );
        let order: Vec<&str> = wiring_order(&topology)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["register_b", "register_a", "link", "activate"]);
    }

    #[test]
    fn test_wiring_dependency_orders_steps_within_phase() {
        let mut token = node("token", &[]);
        token.wiring_deps = vec!["pool".to_string()];
        let topology = Topology::new(
            vec![token, node("pool", &[])],
            vec![
                step("on_token", WiringPhase::PoolRegistration, "token"),
                step("on_pool", WiringPhase::PoolRegistration, "pool"),
            ],
            Vec::new(),
        );
        let order: Vec<&str> = wiring_order(&topology)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["on_pool", "on_token"]);
        // Not a construction edge.
        assert_eq!(names(&resolution_order(&topology).unwrap()), vec!["token", "pool"]);
    }

    #[test]
    fn test_wiring_step_with_unknown_target() {
        let topology = Topology::new(
            vec![node("token", &[])],
            vec![step("link", WiringPhase::TokenLinkage, "missing")],
            Vec::new(),
        );
        assert_eq!(
            wiring_order(&topology).unwrap_err(),
            TopologyError::UnknownDependency {
                node: "link".into(),
                dependency: "missing".into()
            }
        );
    }

    #[test]
    fn test_frax_topology_orders() {
        let topology = topology::frax(&ProtocolPlan::default());
        let order = resolution_order(&topology).unwrap();
        assert_eq!(order.len(), topology.components().len());

        let position = |name: &str| order.iter().position(|c| c.name == name).unwrap();
        assert!(position("timelock") < position("FRAX"));
        assert!(position("FRAX") < position("pool:6DEC"));
        assert!(position("FXS") < position("pool:6DEC"));
        assert!(position("pair:FXS/WETH") < position("staking:FXS/WETH"));

        let wiring = wiring_order(&topology).unwrap();
        assert_eq!(wiring.first().unwrap().id, "register_pool:USDC");
        assert_eq!(wiring[3].id, "link_share_token");
        assert_eq!(wiring.last().unwrap().id, "activate_staking:FXS/WETH");
    }
}
