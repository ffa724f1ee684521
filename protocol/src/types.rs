//! Common types used across the deployment tooling.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use crate::errors::ParseError;

/// Number of hex digits in an address body.
const ADDRESS_HEX_LEN: usize = 40;

/// On-chain account or contract address.
///
/// The text is kept exactly as supplied so checksummed addresses survive a
/// manifest round trip; equality, ordering and hashing ignore hex case.
#[derive(Clone, Debug)]
pub struct Address(String);

impl Address {
    /// Parse a `0x`-prefixed 20-byte hex address.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let body = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .ok_or_else(|| ParseError::InvalidAddress {
                value: text.to_string(),
            })?;
        if body.len() != ADDRESS_HEX_LEN || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidAddress {
                value: text.to_string(),
            });
        }
        Ok(Self(text.to_string()))
    }

    /// The all-zero address.
    pub fn zero() -> Self {
        Self::from_low_u64(0)
    }

    /// Address whose low 8 bytes hold `value`.
    pub fn from_low_u64(value: u64) -> Self {
        Self(format!("0x{:040x}", value))
    }

    pub fn is_zero(&self) -> bool {
        self.body().bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn body(&self) -> &str {
        &self.0[2..]
    }

    fn normalized(&self) -> impl Iterator<Item = u8> + '_ {
        self.body().bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.body().eq_ignore_ascii_case(other.body())
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.normalized() {
            state.write_u8(b);
        }
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized().cmp(other.normalized())
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deployment environment. Exactly one is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Environment {
    /// Throwaway development chain
    Local,
    /// Public test network
    Testnet,
    /// Live network
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Local,
        Environment::Testnet,
        Environment::Production,
    ];

    /// Key of this environment in the address registry document.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Testnet => "testnet",
            Environment::Production => "production",
        }
    }

    /// Local chains start empty and are deployed from scratch; shared
    /// networks already carry the protocol.
    pub const fn default_mode(&self) -> ResolutionMode {
        match self {
            Environment::Local => ResolutionMode::Fresh,
            Environment::Testnet | Environment::Production => ResolutionMode::Attach,
        }
    }
}

impl FromStr for Environment {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| ParseError::UnknownEnvironment { name: s.to_string() })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a component obtains its address for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionMode {
    /// Instantiate a new on-chain component
    Fresh,
    /// Reuse the address recorded in the manifest
    Attach,
}

impl ResolutionMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::Fresh => "fresh",
            ResolutionMode::Attach => "attach",
        }
    }
}

impl FromStr for ResolutionMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(ResolutionMode::Fresh),
            "attach" => Ok(ResolutionMode::Attach),
            other => Err(ParseError::UnknownMode {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accounts authorized to submit deployments and configuration calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActorRole {
    /// Owner of the collateral tokens and of both protocol tokens
    CollateralOwner,
    /// Oracle operator recorded in the share token
    Oracle,
    /// Creator of the collateral pools
    PoolCreator,
    /// Timelock administrator
    TimelockAdmin,
    /// Governance guardian
    GovernorGuardian,
    /// Owner of the staking contracts
    StakingOwner,
    /// Staking rewards distributor
    StakingRewardsDistributor,
}

impl ActorRole {
    pub const ALL: [ActorRole; 7] = [
        ActorRole::CollateralOwner,
        ActorRole::Oracle,
        ActorRole::PoolCreator,
        ActorRole::TimelockAdmin,
        ActorRole::GovernorGuardian,
        ActorRole::StakingOwner,
        ActorRole::StakingRewardsDistributor,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorRole::CollateralOwner => "collateral_owner",
            ActorRole::Oracle => "oracle",
            ActorRole::PoolCreator => "pool_creator",
            ActorRole::TimelockAdmin => "timelock_admin",
            ActorRole::GovernorGuardian => "governor_guardian",
            ActorRole::StakingOwner => "staking_owner",
            ActorRole::StakingRewardsDistributor => "staking_rewards_distributor",
        }
    }

    /// Environment variable holding this actor's address.
    pub const fn env_key(&self) -> &'static str {
        match self {
            ActorRole::CollateralOwner => "DEPLOY_ACTOR_COLLATERAL_OWNER",
            ActorRole::Oracle => "DEPLOY_ACTOR_ORACLE",
            ActorRole::PoolCreator => "DEPLOY_ACTOR_POOL_CREATOR",
            ActorRole::TimelockAdmin => "DEPLOY_ACTOR_TIMELOCK_ADMIN",
            ActorRole::GovernorGuardian => "DEPLOY_ACTOR_GOVERNOR_GUARDIAN",
            ActorRole::StakingOwner => "DEPLOY_ACTOR_STAKING_OWNER",
            ActorRole::StakingRewardsDistributor => "DEPLOY_ACTOR_STAKING_REWARDS_DISTRIBUTOR",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level grouping of the address manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Main,
    Weth,
    Oracles,
    Collateral,
    Governance,
    Pools,
    UniswapOther,
    Pricing,
    Misc,
    Libraries,
    StakeTokens,
    StakingContractsForTokens,
}

impl Category {
    /// Layout order used when a category is first written.
    pub const ALL: [Category; 12] = [
        Category::Main,
        Category::Weth,
        Category::Oracles,
        Category::Collateral,
        Category::Governance,
        Category::Pools,
        Category::UniswapOther,
        Category::Pricing,
        Category::Misc,
        Category::Libraries,
        Category::StakeTokens,
        Category::StakingContractsForTokens,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Main => "main",
            Category::Weth => "weth",
            Category::Oracles => "oracles",
            Category::Collateral => "collateral",
            Category::Governance => "governance",
            Category::Pools => "pools",
            Category::UniswapOther => "uniswap_other",
            Category::Pricing => "pricing",
            Category::Misc => "misc",
            Category::Libraries => "libraries",
            Category::StakeTokens => "stake_tokens",
            Category::StakingContractsForTokens => "staking_contracts_for_tokens",
        }
    }

    /// Leaf categories hold a single address instead of a keyed group.
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Category::Weth | Category::Governance)
    }
}

impl FromStr for Category {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseError::UnknownCategory { name: s.to_string() })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a component inside an environment's manifest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManifestPath {
    pub category: Category,
    /// Entry key inside the category; `None` for leaf categories.
    pub key: Option<String>,
}

impl ManifestPath {
    pub fn leaf(category: Category) -> Self {
        Self {
            category,
            key: None,
        }
    }

    pub fn entry(category: Category, key: impl Into<String>) -> Self {
        Self {
            category,
            key: Some(key.into()),
        }
    }
}

impl fmt::Display for ManifestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}.{}", self.category, key),
            None => write!(f, "{}", self.category),
        }
    }
}

/// Kind of protocol unit a component is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Stable token, share token, vesting
    Token,
    /// Collateral token (including wrapped ether)
    Collateral,
    /// Collateral pool
    Pool,
    /// Pair price oracle
    Oracle,
    /// Router or factory for liquidity markets
    Market,
    /// Liquidity pair created by the factory
    LiquidityPair,
    /// Staking rewards contract
    Staking,
    /// Governor or timelock
    Governance,
    /// Price steering helper
    Pricing,
    /// Migration helper and other utilities
    Utility,
}

/// Argument or return value exchanged with the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Address(Address),
    Uint(u128),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            Value::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Address(address) => write!(f, "{}", address),
            Value::Uint(amount) => write!(f, "{}", amount),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Text(text) => write!(f, "{:?}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_case_insensitive_equality() {
        let lower = Address::parse("0xabcdef0000000000000000000000000000000001").unwrap();
        let mixed = Address::parse("0xABCdef0000000000000000000000000000000001").unwrap();
        assert_eq!(lower, mixed);
        // Text is preserved as written
        assert_eq!(mixed.as_str(), "0xABCdef0000000000000000000000000000000001");
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("abcdef0000000000000000000000000000000001").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzzcdef0000000000000000000000000000000001").is_err());
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::zero().is_zero());
        assert!(!Address::from_low_u64(7).is_zero());
        assert_eq!(
            Address::from_low_u64(255).as_str(),
            "0x00000000000000000000000000000000000000ff"
        );
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("local".parse::<Environment>(), Ok(Environment::Local));
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(
            "ganache".parse::<Environment>(),
            Err(ParseError::UnknownEnvironment {
                name: "ganache".to_string()
            })
        );
    }

    #[test]
    fn test_environment_default_modes() {
        assert_eq!(Environment::Local.default_mode(), ResolutionMode::Fresh);
        assert_eq!(Environment::Testnet.default_mode(), ResolutionMode::Attach);
        assert_eq!(Environment::Production.default_mode(), ResolutionMode::Attach);
    }

    #[test]
    fn test_leaf_categories() {
        let leaves: Vec<_> = Category::ALL.iter().filter(|c| c.is_leaf()).collect();
        assert_eq!(leaves, vec![&Category::Weth, &Category::Governance]);
    }

    #[test]
    fn test_manifest_path_display() {
        assert_eq!(
            ManifestPath::entry(Category::Oracles, "FRAX_FXS").to_string(),
            "oracles.FRAX_FXS"
        );
        assert_eq!(ManifestPath::leaf(Category::Governance).to_string(), "governance");
    }
}
