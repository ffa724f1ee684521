//! Static protocol topology: which components exist, how each one is
//! provisioned, and which configuration calls wire them together.

use crate::types::{ActorRole, Category, ComponentKind, ManifestPath};

/// Stable-asset token
pub const STABLE_TOKEN: &str = "FRAX";
/// Governance-share token
pub const SHARE_TOKEN: &str = "FXS";
pub const VESTING: &str = "vesting";
pub const WETH: &str = "WETH";
pub const TIMELOCK: &str = "timelock";
pub const MIGRATION_HELPER: &str = "migration_helper";
pub const GOVERNANCE: &str = "governance";
pub const ROUTER: &str = "uniswap_router";
pub const FACTORY: &str = "uniswap_factory";
pub const SWAP_TO_PRICE: &str = "swap_to_price";

/// Timelock delay (2 days)
pub const TIMELOCK_DELAY_SECS: u128 = 86_400 * 2;
/// Genesis supply minted to the owner of each test collateral, in whole tokens
pub const COLLATERAL_GENESIS_SUPPLY: u128 = 100_000_000;
/// Pool ceiling in whole stable tokens
pub const POOL_CEILING: u128 = 5_000_000;

/// Auxiliary libraries linked into earlier deployments. Their addresses are
/// never resolved here, only carried forward in the manifest.
pub const LIBRARIES: [&str; 3] = ["UniswapV2OracleLibrary", "UniswapV2Library", "FraxPoolLibrary"];

/// Method signatures used during resolution and wiring.
pub mod methods {
    pub const GET_PAIR: &str = "getPair(address,address)";
    pub const CREATE_PAIR: &str = "createPair(address,address)";
    pub const ADD_POOL: &str = "addPool(address)";
    pub const IS_POOL: &str = "frax_pools(address)";
    pub const SET_FRAX_ADDRESS: &str = "setFRAXAddress(address)";
    pub const FRAX_ADDRESS: &str = "FRAXStablecoinAdd()";
    pub const INITIALIZE_DEFAULT: &str = "initializeDefault()";
    pub const IS_INITIALIZED: &str = "isInitialized()";
}

pub fn collateral_name(symbol: &str) -> String {
    format!("collateral:{}", symbol)
}

pub fn pool_name(symbol: &str) -> String {
    format!("pool:{}", symbol)
}

pub fn oracle_name(base: &str, quote: &str) -> String {
    format!("oracle:{}_{}", base, quote)
}

pub fn pair_name(base: &str, quote: &str) -> String {
    format!("pair:{}/{}", base, quote)
}

pub fn staking_name(base: &str, quote: &str) -> String {
    format!("staking:{}/{}", base, quote)
}

/// Key of a liquidity pair in `stake_tokens` and `staking_contracts_for_tokens`.
pub fn stake_key(base: &str, quote: &str) -> String {
    format!("Uniswap {}/{}", base, quote)
}

/// Component name of the token traded under `symbol`.
pub fn token_component(symbol: &str) -> String {
    match symbol {
        STABLE_TOKEN | SHARE_TOKEN | WETH => symbol.to_string(),
        other => collateral_name(other),
    }
}

/// Constructor or call argument, bound to a concrete value at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSpec {
    /// Address of another component
    Component(String),
    /// Address of an actor account
    Actor(ActorRole),
    Uint(u128),
    Text(String),
}

impl ArgSpec {
    pub fn component(name: impl Into<String>) -> Self {
        ArgSpec::Component(name.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        ArgSpec::Text(text.into())
    }

    pub fn component_ref(&self) -> Option<&str> {
        match self {
            ArgSpec::Component(name) => Some(name),
            _ => None,
        }
    }
}

/// How a component comes into existence when it is not attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provision {
    /// Instantiate `artifact` through the ledger.
    Deploy {
        artifact: String,
        actor: ActorRole,
        args: Vec<ArgSpec>,
    },
    /// Liquidity pair owned by a factory: discovered through `getPair`,
    /// created through `createPair` on fresh runs.
    Pair {
        factory: String,
        token_a: String,
        token_b: String,
        creator: ActorRole,
    },
}

/// Static metadata of one logical component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    /// Unique logical name
    pub name: String,
    pub kind: ComponentKind,
    /// Where the address lives in the manifest
    pub slot: ManifestPath,
    pub provision: Provision,
    /// Components that must exist before this one can be wired
    pub wiring_deps: Vec<String>,
}

impl ComponentDescriptor {
    /// Components whose addresses are needed to provision this one.
    pub fn construction_deps(&self) -> Vec<&str> {
        match &self.provision {
            Provision::Deploy { args, .. } => {
                args.iter().filter_map(ArgSpec::component_ref).collect()
            }
            Provision::Pair {
                factory,
                token_a,
                token_b,
                ..
            } => vec![factory.as_str(), token_a.as_str(), token_b.as_str()],
        }
    }

    /// Construction and wiring dependencies, without duplicates.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = self.construction_deps();
        for dep in &self.wiring_deps {
            if !deps.contains(&dep.as_str()) {
                deps.push(dep.as_str());
            }
        }
        deps
    }
}

/// Fixed wiring phases. Every step of a phase runs after every step of the
/// earlier phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WiringPhase {
    /// Register collateral pools with the stable token
    PoolRegistration,
    /// Bind the share token to the stable token
    TokenLinkage,
    /// Activate staking schedules
    StakingActivation,
}

impl WiringPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WiringPhase::PoolRegistration => "pool_registration",
            WiringPhase::TokenLinkage => "token_linkage",
            WiringPhase::StakingActivation => "staking_activation",
        }
    }
}

/// What the probe read must return for a step to count as applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Probe returns `true`
    True,
    /// Probe returns the address of the named component
    EqualsComponent(String),
}

/// Read that detects whether a wiring step is already in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub method: String,
    pub args: Vec<ArgSpec>,
    pub expect: Expectation,
}

/// Configuration transaction establishing a relationship between components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringStep {
    /// Unique step identifier, used in logs and diagnostics
    pub id: String,
    pub phase: WiringPhase,
    pub actor: ActorRole,
    /// Component the call is sent to
    pub target: String,
    pub method: String,
    pub args: Vec<ArgSpec>,
    pub probe: Probe,
    /// Extra components that must be resolved before the step runs
    pub after: Vec<String>,
}

impl WiringStep {
    /// Every component the step touches or waits for.
    pub fn components(&self) -> Vec<&str> {
        let mut names = vec![self.target.as_str()];
        let referenced = self
            .args
            .iter()
            .chain(self.probe.args.iter())
            .filter_map(ArgSpec::component_ref)
            .chain(self.after.iter().map(String::as_str));
        for name in referenced {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if let Expectation::EqualsComponent(name) = &self.probe.expect {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        names
    }
}

/// The full set of components and wiring steps for one protocol instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    components: Vec<ComponentDescriptor>,
    wiring: Vec<WiringStep>,
    libraries: Vec<String>,
}

impl Topology {
    pub fn new(
        components: Vec<ComponentDescriptor>,
        wiring: Vec<WiringStep>,
        libraries: Vec<String>,
    ) -> Self {
        Self {
            components,
            wiring,
            libraries,
        }
    }

    /// Components in declaration order.
    pub fn components(&self) -> &[ComponentDescriptor] {
        &self.components
    }

    /// Wiring steps in declaration order.
    pub fn wiring(&self) -> &[WiringStep] {
        &self.wiring
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn component(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// A collateral token and its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollateralSpec {
    pub symbol: String,
    pub decimals: u8,
}

impl CollateralSpec {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// A liquidity pair carrying a staking contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSpec {
    pub base: String,
    pub quote: String,
}

impl PairSpec {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

/// Parameters the topology is generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolPlan {
    pub collaterals: Vec<CollateralSpec>,
    pub staking_pairs: Vec<PairSpec>,
}

impl Default for ProtocolPlan {
    fn default() -> Self {
        Self {
            collaterals: vec![
                CollateralSpec::new("USDC", 18),
                CollateralSpec::new("USDT", 18),
                CollateralSpec::new("6DEC", 6),
            ],
            staking_pairs: vec![
                PairSpec::new(STABLE_TOKEN, WETH),
                PairSpec::new(STABLE_TOKEN, "USDC"),
                PairSpec::new(STABLE_TOKEN, SHARE_TOKEN),
                PairSpec::new(SHARE_TOKEN, WETH),
            ],
        }
    }
}

fn deploy(
    name: impl Into<String>,
    kind: ComponentKind,
    slot: ManifestPath,
    artifact: impl Into<String>,
    actor: ActorRole,
    args: Vec<ArgSpec>,
) -> ComponentDescriptor {
    ComponentDescriptor {
        name: name.into(),
        kind,
        slot,
        provision: Provision::Deploy {
            artifact: artifact.into(),
            actor,
            args,
        },
        wiring_deps: Vec::new(),
    }
}

/// Oracle pairs in manifest order: stable and share against wrapped ether,
/// every collateral and each other, then every collateral against wrapped
/// ether.
fn oracle_pairs(plan: &ProtocolPlan) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for base in [STABLE_TOKEN, SHARE_TOKEN] {
        pairs.push((base.to_string(), WETH.to_string()));
        for collateral in &plan.collaterals {
            pairs.push((base.to_string(), collateral.symbol.clone()));
        }
        if base == STABLE_TOKEN {
            pairs.push((STABLE_TOKEN.to_string(), SHARE_TOKEN.to_string()));
        }
    }
    for collateral in &plan.collaterals {
        pairs.push((collateral.symbol.clone(), WETH.to_string()));
    }
    pairs
}

/// Build the Frax protocol topology for `plan`.
pub fn frax(plan: &ProtocolPlan) -> Topology {
    use ActorRole::*;

    let mut components = vec![
        deploy(
            TIMELOCK,
            ComponentKind::Governance,
            ManifestPath::entry(Category::Misc, "timelock"),
            "Timelock",
            TimelockAdmin,
            vec![ArgSpec::Actor(TimelockAdmin), ArgSpec::Uint(TIMELOCK_DELAY_SECS)],
        ),
        deploy(
            MIGRATION_HELPER,
            ComponentKind::Utility,
            ManifestPath::entry(Category::Misc, "migration_helper"),
            "MigrationHelper",
            CollateralOwner,
            vec![ArgSpec::Actor(CollateralOwner)],
        ),
        deploy(
            STABLE_TOKEN,
            ComponentKind::Token,
            ManifestPath::entry(Category::Main, STABLE_TOKEN),
            "FRAXStablecoin",
            CollateralOwner,
            vec![
                ArgSpec::text("Frax"),
                ArgSpec::text(STABLE_TOKEN),
                ArgSpec::Actor(CollateralOwner),
                ArgSpec::component(TIMELOCK),
            ],
        ),
        deploy(
            SHARE_TOKEN,
            ComponentKind::Token,
            ManifestPath::entry(Category::Main, SHARE_TOKEN),
            "FRAXShares",
            CollateralOwner,
            vec![
                ArgSpec::text("Frax Share"),
                ArgSpec::text(SHARE_TOKEN),
                ArgSpec::Actor(Oracle),
                ArgSpec::Actor(CollateralOwner),
                ArgSpec::component(TIMELOCK),
            ],
        ),
        deploy(
            VESTING,
            ComponentKind::Token,
            ManifestPath::entry(Category::Main, "vesting"),
            "TokenVesting",
            CollateralOwner,
            vec![
                ArgSpec::component(SHARE_TOKEN),
                ArgSpec::component(TIMELOCK),
                ArgSpec::Actor(CollateralOwner),
            ],
        ),
        deploy(
            GOVERNANCE,
            ComponentKind::Governance,
            ManifestPath::leaf(Category::Governance),
            "GovernorAlpha",
            TimelockAdmin,
            vec![
                ArgSpec::component(TIMELOCK),
                ArgSpec::component(SHARE_TOKEN),
                ArgSpec::Actor(GovernorGuardian),
            ],
        ),
        deploy(
            WETH,
            ComponentKind::Collateral,
            ManifestPath::leaf(Category::Weth),
            "WETH",
            CollateralOwner,
            vec![ArgSpec::Actor(CollateralOwner)],
        ),
    ];

    for collateral in &plan.collaterals {
        let supply = COLLATERAL_GENESIS_SUPPLY * 10u128.pow(u32::from(collateral.decimals));
        components.push(deploy(
            collateral_name(&collateral.symbol),
            ComponentKind::Collateral,
            ManifestPath::entry(Category::Collateral, collateral.symbol.clone()),
            format!("FakeCollateral_{}", collateral.symbol),
            CollateralOwner,
            vec![
                ArgSpec::Actor(CollateralOwner),
                ArgSpec::Uint(supply),
                ArgSpec::text(collateral.symbol.clone()),
                ArgSpec::Uint(u128::from(collateral.decimals)),
            ],
        ));
    }

    components.push(deploy(
        FACTORY,
        ComponentKind::Market,
        ManifestPath::entry(Category::UniswapOther, "factory"),
        "UniswapV2Factory",
        CollateralOwner,
        vec![ArgSpec::Actor(CollateralOwner)],
    ));
    components.push(deploy(
        ROUTER,
        ComponentKind::Market,
        ManifestPath::entry(Category::UniswapOther, "router"),
        "UniswapV2Router02_Modified",
        CollateralOwner,
        vec![ArgSpec::component(FACTORY), ArgSpec::component(WETH)],
    ));
    components.push(deploy(
        SWAP_TO_PRICE,
        ComponentKind::Pricing,
        ManifestPath::entry(Category::Pricing, "swap_to_price"),
        "SwapToPrice",
        CollateralOwner,
        vec![ArgSpec::component(FACTORY), ArgSpec::component(ROUTER)],
    ));

    let pool_ceiling = POOL_CEILING * 10u128.pow(18);
    for collateral in &plan.collaterals {
        components.push(deploy(
            pool_name(&collateral.symbol),
            ComponentKind::Pool,
            ManifestPath::entry(Category::Pools, collateral.symbol.clone()),
            format!("Pool_{}", collateral.symbol),
            PoolCreator,
            vec![
                ArgSpec::component(STABLE_TOKEN),
                ArgSpec::component(SHARE_TOKEN),
                ArgSpec::component(collateral_name(&collateral.symbol)),
                ArgSpec::Actor(PoolCreator),
                ArgSpec::component(TIMELOCK),
                ArgSpec::Uint(pool_ceiling),
            ],
        ));
    }

    for pair in &plan.staking_pairs {
        components.push(ComponentDescriptor {
            name: pair_name(&pair.base, &pair.quote),
            kind: ComponentKind::LiquidityPair,
            slot: ManifestPath::entry(Category::StakeTokens, stake_key(&pair.base, &pair.quote)),
            provision: Provision::Pair {
                factory: FACTORY.to_string(),
                token_a: token_component(&pair.base),
                token_b: token_component(&pair.quote),
                creator: CollateralOwner,
            },
            wiring_deps: Vec::new(),
        });
    }

    for (base, quote) in oracle_pairs(plan) {
        components.push(deploy(
            oracle_name(&base, &quote),
            ComponentKind::Oracle,
            ManifestPath::entry(Category::Oracles, format!("{}_{}", base, quote)),
            format!("UniswapPairOracle_{}_{}", base, quote),
            CollateralOwner,
            vec![
                ArgSpec::component(FACTORY),
                ArgSpec::component(token_component(&base)),
                ArgSpec::component(token_component(&quote)),
                ArgSpec::Actor(CollateralOwner),
                ArgSpec::component(TIMELOCK),
            ],
        ));
    }

    for pair in &plan.staking_pairs {
        components.push(deploy(
            staking_name(&pair.base, &pair.quote),
            ComponentKind::Staking,
            ManifestPath::entry(
                Category::StakingContractsForTokens,
                stake_key(&pair.base, &pair.quote),
            ),
            format!("Stake_{}_{}", pair.base, pair.quote),
            StakingOwner,
            vec![
                ArgSpec::Actor(StakingOwner),
                ArgSpec::Actor(StakingRewardsDistributor),
                ArgSpec::component(SHARE_TOKEN),
                ArgSpec::component(pair_name(&pair.base, &pair.quote)),
                ArgSpec::component(STABLE_TOKEN),
                ArgSpec::component(TIMELOCK),
            ],
        ));
    }

    // Wiring dependencies: the stable token is wired to every pool, the share
    // token to the stable token.
    let pools: Vec<String> = plan.collaterals.iter().map(|c| pool_name(&c.symbol)).collect();
    for descriptor in components.iter_mut() {
        match descriptor.name.as_str() {
            STABLE_TOKEN => descriptor.wiring_deps = pools.clone(),
            SHARE_TOKEN => descriptor.wiring_deps = vec![STABLE_TOKEN.to_string()],
            _ => {}
        }
    }

    let mut wiring = Vec::new();
    for collateral in &plan.collaterals {
        let pool = pool_name(&collateral.symbol);
        wiring.push(WiringStep {
            id: format!("register_pool:{}", collateral.symbol),
            phase: WiringPhase::PoolRegistration,
            actor: CollateralOwner,
            target: STABLE_TOKEN.to_string(),
            method: methods::ADD_POOL.to_string(),
            args: vec![ArgSpec::component(pool.clone())],
            probe: Probe {
                method: methods::IS_POOL.to_string(),
                args: vec![ArgSpec::component(pool)],
                expect: Expectation::True,
            },
            after: Vec::new(),
        });
    }
    wiring.push(WiringStep {
        id: "link_share_token".to_string(),
        phase: WiringPhase::TokenLinkage,
        actor: CollateralOwner,
        target: SHARE_TOKEN.to_string(),
        method: methods::SET_FRAX_ADDRESS.to_string(),
        args: vec![ArgSpec::component(STABLE_TOKEN)],
        probe: Probe {
            method: methods::FRAX_ADDRESS.to_string(),
            args: Vec::new(),
            expect: Expectation::EqualsComponent(STABLE_TOKEN.to_string()),
        },
        after: Vec::new(),
    });
    for pair in &plan.staking_pairs {
        wiring.push(WiringStep {
            id: format!("activate_staking:{}/{}", pair.base, pair.quote),
            phase: WiringPhase::StakingActivation,
            actor: StakingOwner,
            target: staking_name(&pair.base, &pair.quote),
            method: methods::INITIALIZE_DEFAULT.to_string(),
            args: Vec::new(),
            probe: Probe {
                method: methods::IS_INITIALIZED.to_string(),
                args: Vec::new(),
                expect: Expectation::True,
            },
            after: vec![pair_name(&pair.base, &pair.quote)],
        });
    }

    Topology::new(
        components,
        wiring,
        LIBRARIES.iter().map(|name| name.to_string()).collect(),
    )
}
