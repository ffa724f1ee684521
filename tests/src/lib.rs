//! Frax deployment scenario tests
//!
//! End-to-end runs of the orchestrator against the in-memory chain and a
//! registry file in a temporary directory.

use frax_deploy_orchestrator::{
    Actors, AddressRegistry, DeployError, LocalChain, ModePolicy, Orchestrator, RunReport,
};
use frax_deploy_protocol::topology::{self, PairSpec, ProtocolPlan, Topology};
use frax_deploy_protocol::{Environment, ResolutionMode};

/// Run the orchestrator once with the given mode policy.
pub fn run_once(
    chain: &mut LocalChain,
    registry: &AddressRegistry,
    topology: &Topology,
    actors: &Actors,
    environment: Environment,
    modes: ModePolicy,
) -> Result<RunReport, DeployError> {
    Orchestrator::new(chain, registry, topology, actors, environment, modes).run()
}

/// The default Frax topology: three collaterals, four staking pairs.
pub fn default_topology() -> Topology {
    topology::frax(&ProtocolPlan::default())
}

pub fn fresh() -> ModePolicy {
    ModePolicy::new(ResolutionMode::Fresh)
}

pub fn attach() -> ModePolicy {
    ModePolicy::new(ResolutionMode::Attach)
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use frax_deploy_orchestrator::{Origin, StepStatus};
    use frax_deploy_protocol::topology::methods;
    use frax_deploy_protocol::{Category, Ledger, ManifestPath, Value};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> AddressRegistry {
        AddressRegistry::new(dir.path().join("deployments").join("addresses.json"))
    }

    // ===== Fresh deployment =====

    #[test]
    fn test_local_fresh_run_deploys_and_wires_everything() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();

        let report = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh())
            .unwrap();

        // 3 pools registered, share token linked, 4 stakings activated
        let applied: Vec<&str> = report.wiring.iter().map(|o| o.step.as_str()).collect();
        assert_eq!(
            applied,
            vec![
                "register_pool:USDC",
                "register_pool:USDT",
                "register_pool:6DEC",
                "link_share_token",
                "activate_staking:FRAX/WETH",
                "activate_staking:FRAX/USDC",
                "activate_staking:FRAX/FXS",
                "activate_staking:FXS/WETH",
            ]
        );
        assert_eq!(report.applied_count(), 8);

        // 4 liquidity pairs through the factory
        let pairs: Vec<Origin> = report
            .resolved
            .iter()
            .filter(|c| c.name.starts_with("pair:"))
            .map(|c| c.origin)
            .collect();
        assert_eq!(pairs, vec![Origin::Created; 4]);

        // Every pool reports as registered with the stable token
        let frax = report.resolved.address(topology::STABLE_TOKEN).unwrap();
        for symbol in ["USDC", "USDT", "6DEC"] {
            let pool = report.resolved.address(&topology::pool_name(symbol)).unwrap();
            assert_eq!(
                chain
                    .read(frax, methods::IS_POOL, &[Value::Address(pool.clone())])
                    .unwrap(),
                Value::Bool(true)
            );
        }

        // Manifest holds every deployed slot and nothing else beyond libraries
        let stored = registry.load(Environment::Local).unwrap();
        assert_eq!(stored, report.manifest);
        assert_eq!(
            stored.entries().len(),
            topology.components().len() + topology.libraries().len()
        );
        assert_eq!(
            stored.get(&ManifestPath::entry(Category::StakeTokens, "Uniswap FRAX/FXS")),
            Some(
                report
                    .resolved
                    .address("pair:FRAX/FXS")
                    .unwrap()
                    .as_str()
            )
        );
    }

    #[test]
    fn test_fresh_run_without_prior_uses_standard_layout() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh()).unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(registry.path()).unwrap()).unwrap();
        let categories: Vec<&str> = document["local"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            categories,
            vec![
                "main",
                "weth",
                "oracles",
                "collateral",
                "governance",
                "pools",
                "uniswap_other",
                "pricing",
                "misc",
                "libraries",
                "stake_tokens",
                "staking_contracts_for_tokens",
            ]
        );
    }

    #[test]
    fn test_fresh_mode_ignores_recorded_addresses() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        std::fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        std::fs::write(
            registry.path(),
            r#"{ "local": { "main": { "FRAX": "garbage" }, "weth": "0x0000000000000000000000000000000000000000" } }"#,
        )
        .unwrap();
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();

        let report = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh())
            .unwrap();
        let frax = report.resolved.get(topology::STABLE_TOKEN).unwrap();
        assert_eq!(frax.origin, Origin::Deployed);
        assert_eq!(
            report.manifest.get(&ManifestPath::entry(Category::Main, "FRAX")),
            Some(frax.address.as_str())
        );
    }

    #[test]
    fn test_deployment_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        chain.fail_instantiation("Pool_USDT");
        let actors = chain.actors();

        let err = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh())
            .unwrap_err();
        match &err {
            DeployError::Deployment { component, .. } => assert_eq!(component, "pool:USDT"),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(chain.call_count(), 0);
        assert!(registry.diagnostics_path(Environment::Local).exists());
        assert!(!registry.path().exists());
    }

    // ===== Attach mode =====

    #[test]
    fn test_testnet_missing_oracle_fails_without_transactions() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();

        // Populate testnet from a fresh deployment, then drop one oracle.
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        let report = run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, fresh())
            .unwrap();
        let mut document = report.manifest.to_json();
        document["oracles"]
            .as_object_mut()
            .unwrap()
            .remove("FRAX_FXS");
        std::fs::write(
            registry.path(),
            serde_json::to_string_pretty(&serde_json::json!({ "testnet": document })).unwrap(),
        )
        .unwrap();

        let before = chain.transactions().len();
        let err = run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, attach())
            .unwrap_err();
        match &err {
            DeployError::MissingAddress { component, path } => {
                assert_eq!(component, "oracle:FRAX_FXS");
                assert_eq!(path.to_string(), "oracles.FRAX_FXS");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.code(), 201);
        assert_eq!(chain.transactions().len(), before);
    }

    #[test]
    fn test_attach_never_instantiates() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, fresh()).unwrap();

        let deployed = chain.instantiation_count();
        let report = run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, attach())
            .unwrap();
        assert_eq!(chain.instantiation_count(), deployed);
        assert!(report
            .resolved
            .iter()
            .all(|c| matches!(c.origin, Origin::Attached | Origin::Discovered)));
    }

    #[test]
    fn test_attach_with_missing_pair_is_pair_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, fresh()).unwrap();

        // One more staking pair than was deployed: its tokens and the factory
        // are all attached, so the factory is asked for a pair it never made.
        let mut plan = ProtocolPlan::default();
        plan.staking_pairs.push(PairSpec::new(topology::SHARE_TOKEN, "USDC"));
        let extended = topology::frax(&plan);
        let modes = attach().with_override(
            topology::staking_name(topology::SHARE_TOKEN, "USDC"),
            ResolutionMode::Fresh,
        );
        let mined = chain.transactions().len();
        let err = run_once(&mut chain, &registry, &extended, &actors, Environment::Testnet, modes)
            .unwrap_err();
        match &err {
            DeployError::PairNotFound { component } => assert_eq!(component, "pair:FXS/USDC"),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.code(), 203);
        assert_eq!(chain.transactions().len(), mined);
    }

    #[test]
    fn test_redeployed_token_recreates_its_pairs_in_attach_run() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        let first = run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, fresh())
            .unwrap();

        let modes = attach().with_override(topology::STABLE_TOKEN, ResolutionMode::Fresh);
        let second = run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, modes)
            .unwrap();
        for pair in ["pair:FRAX/WETH", "pair:FRAX/USDC", "pair:FRAX/FXS"] {
            let resolved = second.resolved.get(pair).unwrap();
            assert_eq!(resolved.origin, Origin::Created);
            assert_ne!(Some(&resolved.address), first.resolved.address(pair));
        }
        assert_eq!(
            second.resolved.get("pair:FXS/WETH").unwrap().origin,
            Origin::Discovered
        );
        // Pools are registered with the new stable token, the share token is
        // relinked, staking was already active.
        assert_eq!(second.applied_count(), 4);
    }

    #[test]
    fn test_override_attaches_single_component() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        let first = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh())
            .unwrap();
        let weth = first.resolved.address(topology::WETH).unwrap().clone();

        let modes = fresh().with_override(topology::WETH, ResolutionMode::Attach);
        let second = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, modes)
            .unwrap();
        let attached = second.resolved.get(topology::WETH).unwrap();
        assert_eq!(attached.origin, Origin::Attached);
        assert_eq!(attached.address, weth);
        assert_eq!(
            second.resolved.get(topology::STABLE_TOKEN).unwrap().origin,
            Origin::Deployed
        );
    }

    // ===== Idempotence =====

    #[test]
    fn test_rerun_against_wired_environment_issues_no_transactions() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, fresh()).unwrap();
        let manifest_bytes = std::fs::read(registry.path()).unwrap();
        let mined = chain.transactions().len();

        let report = run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, attach())
            .unwrap();
        assert_eq!(chain.transactions().len(), mined);
        assert_eq!(report.applied_count(), 0);
        assert!(report
            .wiring
            .iter()
            .all(|o| o.status == StepStatus::AlreadyApplied));
        // Nothing changed, so the manifest file is untouched.
        assert_eq!(std::fs::read(registry.path()).unwrap(), manifest_bytes);
    }

    #[test]
    fn test_rerun_after_partial_failure_applies_only_missing_steps() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();

        chain.fail_call(methods::INITIALIZE_DEFAULT);
        let err = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh())
            .unwrap_err();
        assert_eq!(err.code(), 500);

        // The diagnostics carry everything needed to attach on the next run.
        let diagnostics: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(registry.diagnostics_path(Environment::Local)).unwrap(),
        )
        .unwrap();
        assert_eq!(diagnostics["wiring"].as_array().unwrap().len(), 4);
        assert_eq!(diagnostics["failed_in"], "wiring");
        std::fs::write(
            registry.path(),
            serde_json::to_string_pretty(&serde_json::json!({
                "local": diagnostics["manifest"].clone()
            }))
            .unwrap(),
        )
        .unwrap();

        chain.clear_failures();
        let calls_before = chain.call_count();
        let report = run_once(&mut chain, &registry, &topology, &actors, Environment::Local, attach())
            .unwrap();
        let applied: Vec<&str> = report
            .wiring
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Applied { .. }))
            .map(|o| o.step.as_str())
            .collect();
        assert_eq!(
            applied,
            vec![
                "activate_staking:FRAX/WETH",
                "activate_staking:FRAX/USDC",
                "activate_staking:FRAX/FXS",
                "activate_staking:FXS/WETH",
            ]
        );
        assert_eq!(chain.call_count(), calls_before + 4);
    }

    #[test]
    fn test_unauthorized_actor_fails_wiring() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();

        chain.fail_call(methods::ADD_POOL);
        run_once(&mut chain, &registry, &topology, &actors, Environment::Local, fresh()).unwrap_err();
        let diagnostics: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(registry.diagnostics_path(Environment::Local)).unwrap(),
        )
        .unwrap();
        std::fs::write(
            registry.path(),
            serde_json::to_string_pretty(&serde_json::json!({
                "local": diagnostics["manifest"].clone()
            }))
            .unwrap(),
        )
        .unwrap();
        chain.clear_failures();

        // Same accounts, except the collateral owner is an outsider.
        let mut accounts: Vec<_> = (1..=7).map(|i| chain.account(i)).collect();
        accounts[0] = chain.account(9);
        let impostors = Actors::from_accounts(&accounts);

        let err = run_once(&mut chain, &registry, &topology, &impostors, Environment::Local, attach())
            .unwrap_err();
        match &err {
            DeployError::Wiring { step, target, .. } => {
                assert_eq!(step, "register_pool:USDC");
                assert_eq!(target, "FRAX");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    // ===== Manifest forward-fill =====

    #[test]
    fn test_libraries_and_unknown_categories_survive_a_run() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let topology = default_topology();
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, fresh()).unwrap();

        let mut manifest = registry.load(Environment::Testnet).unwrap().to_json();
        manifest["libraries"]["UniswapV2Library"] =
            serde_json::json!("0x00000000000000000000000000000000000000Ab");
        manifest["bridges"] = serde_json::json!({ "polygon": "0x0000000000000000000000000000000000000077" });
        std::fs::write(
            registry.path(),
            serde_json::to_string_pretty(&serde_json::json!({
                "production": { "weth": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2" },
                "testnet": manifest
            }))
            .unwrap(),
        )
        .unwrap();

        // Redeploy the stable token so the manifest actually changes.
        let modes = attach().with_override(topology::STABLE_TOKEN, ResolutionMode::Fresh);
        run_once(&mut chain, &registry, &topology, &actors, Environment::Testnet, modes).unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(registry.path()).unwrap()).unwrap();
        assert_eq!(
            document["testnet"]["libraries"]["UniswapV2Library"],
            "0x00000000000000000000000000000000000000Ab"
        );
        assert_eq!(document["testnet"]["libraries"]["FraxPoolLibrary"], "");
        assert_eq!(
            document["testnet"]["bridges"]["polygon"],
            "0x0000000000000000000000000000000000000077"
        );
        assert_eq!(
            document["production"],
            serde_json::json!({ "weth": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2" })
        );
    }
}

#[cfg(test)]
mod ordering_tests {
    use super::*;
    use frax_deploy_orchestrator::graph;
    use frax_deploy_orchestrator::TopologyError;
    use frax_deploy_protocol::topology::{ArgSpec, Provision};

    #[test]
    fn test_wiring_order_ignores_declaration_order() {
        let topology = default_topology();
        let mut steps = topology.wiring().to_vec();
        steps.reverse();
        let shuffled = Topology::new(
            topology.components().to_vec(),
            steps,
            topology.libraries().to_vec(),
        );

        let phases = |t: &Topology| -> Vec<String> {
            graph::wiring_order(t)
                .unwrap()
                .into_iter()
                .map(|s| s.phase.as_str().to_string())
                .collect()
        };
        assert_eq!(phases(&shuffled), phases(&topology));
    }

    #[test]
    fn test_cycle_is_topology_error_before_any_transaction() {
        let topology = default_topology();
        let mut components = topology.components().to_vec();
        // Make the timelock depend on governance, which depends on the timelock.
        if let Some(timelock) = components.iter_mut().find(|c| c.name == topology::TIMELOCK) {
            if let Provision::Deploy { args, .. } = &mut timelock.provision {
                args.push(ArgSpec::component(topology::GOVERNANCE));
            }
        }
        let cyclic = Topology::new(components, topology.wiring().to_vec(), Vec::new());

        let dir = tempfile::TempDir::new().unwrap();
        let registry = AddressRegistry::new(dir.path().join("addresses.json"));
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        let err = run_once(&mut chain, &registry, &cyclic, &actors, Environment::Local, fresh())
            .unwrap_err();
        assert_eq!(err.exit_status(), 3);
        match err {
            DeployError::Topology(TopologyError::Cycle { members }) => {
                assert!(members.contains(&topology::TIMELOCK.to_string()));
                assert!(members.contains(&topology::GOVERNANCE.to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(chain.transactions().is_empty());
    }
}
