//! In-memory chain simulating the Frax contracts the orchestrator talks to.
//!
//! Accounts and contract addresses are deterministic. Every transaction is
//! mined into its own block. Configuration calls are owner-only, where the
//! owner is the account that instantiated the contract.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use frax_deploy_protocol::topology::methods;
use frax_deploy_protocol::{Address, Ledger, LedgerError, Receipt, Value};

use crate::config::Actors;

const ACCOUNT_BASE: u64 = 0xA0_0000;
const CONTRACT_BASE: u64 = 0xC0_0000;
const ACCOUNT_COUNT: u64 = 10;

const FACTORY_ARTIFACT: &str = "UniswapV2Factory";
const PAIR_ARTIFACT: &str = "UniswapV2Pair";
const STABLE_ARTIFACT: &str = "FRAXStablecoin";
const SHARE_ARTIFACT: &str = "FRAXShares";
const STAKING_ARTIFACT_PREFIX: &str = "Stake_";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ContractState {
    Factory { pairs: HashMap<(Address, Address), Address> },
    StableToken { pools: Vec<Address> },
    ShareToken { stable: Address },
    Staking { initialized: bool },
    Plain,
}

impl ContractState {
    fn for_artifact(artifact: &str) -> Self {
        match artifact {
            FACTORY_ARTIFACT => ContractState::Factory {
                pairs: HashMap::new(),
            },
            STABLE_ARTIFACT => ContractState::StableToken { pools: Vec::new() },
            SHARE_ARTIFACT => ContractState::ShareToken {
                stable: Address::zero(),
            },
            other if other.starts_with(STAKING_ARTIFACT_PREFIX) => {
                ContractState::Staking { initialized: false }
            }
            _ => ContractState::Plain,
        }
    }
}

#[derive(Debug, Clone)]
struct Contract {
    artifact: String,
    owner: Address,
    state: ContractState,
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Instantiate {
        artifact: String,
        address: Address,
        from: Address,
        block: u64,
    },
    Call {
        target: Address,
        method: String,
        from: Address,
        block: u64,
    },
}

#[derive(Debug)]
pub struct LocalChain {
    accounts: Vec<Address>,
    contracts: HashMap<Address, Contract>,
    next_contract: u64,
    transactions: Vec<Transaction>,
    reads: Cell<usize>,
    failing_artifacts: HashSet<String>,
    failing_methods: HashSet<String>,
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChain {
    pub fn new() -> Self {
        Self {
            accounts: (0..ACCOUNT_COUNT)
                .map(|i| Address::from_low_u64(ACCOUNT_BASE + i))
                .collect(),
            contracts: HashMap::new(),
            next_contract: CONTRACT_BASE,
            transactions: Vec::new(),
            reads: Cell::new(0),
            failing_artifacts: HashSet::new(),
            failing_methods: HashSet::new(),
        }
    }

    /// Funded account `index`. Panics past the last account.
    pub fn account(&self, index: usize) -> Address {
        self.accounts[index].clone()
    }

    /// Accounts 1..=7, one per actor role.
    pub fn actors(&self) -> Actors {
        Actors::from_accounts(&self.accounts[1..=7])
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn instantiation_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| matches!(tx, Transaction::Instantiate { .. }))
            .count()
    }

    /// Configuration calls mined so far.
    pub fn call_count(&self) -> usize {
        self.transactions.len() - self.instantiation_count()
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    /// Artifact deployed at `address`, if any.
    pub fn artifact_at(&self, address: &Address) -> Option<&str> {
        self.contracts.get(address).map(|c| c.artifact.as_str())
    }

    /// Make every later instantiation of `artifact` revert.
    pub fn fail_instantiation(&mut self, artifact: impl Into<String>) {
        self.failing_artifacts.insert(artifact.into());
    }

    /// Make every later call to `method` revert.
    pub fn fail_call(&mut self, method: impl Into<String>) {
        self.failing_methods.insert(method.into());
    }

    pub fn clear_failures(&mut self) {
        self.failing_artifacts.clear();
        self.failing_methods.clear();
    }

    fn block(&self) -> u64 {
        self.transactions.len() as u64 + 1
    }

    fn receipt(&self, block: u64) -> Receipt {
        Receipt {
            tx_hash: format!("0x{:064x}", block),
            block,
        }
    }

    fn check_signer(&self, actor: &Address) -> Result<(), LedgerError> {
        if self.accounts.contains(actor) {
            Ok(())
        } else {
            Err(revert(format!("unknown signer {}", actor)))
        }
    }

    fn create_contract(&mut self, artifact: &str, owner: &Address) -> Address {
        let address = Address::from_low_u64(self.next_contract);
        self.next_contract += 1;
        self.contracts.insert(
            address.clone(),
            Contract {
                artifact: artifact.to_string(),
                owner: owner.clone(),
                state: ContractState::for_artifact(artifact),
            },
        );
        address
    }
}

fn revert(reason: impl Into<String>) -> LedgerError {
    LedgerError::Reverted {
        reason: reason.into(),
    }
}

fn address_arg<'v>(method: &str, args: &'v [Value], position: usize) -> Result<&'v Address, LedgerError> {
    args.get(position)
        .and_then(Value::as_address)
        .ok_or_else(|| revert(format!("{}: argument {} is not an address", method, position)))
}

fn pair_key(a: &Address, b: &Address) -> (Address, Address) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

fn only_owner(owner: &Address, actor: &Address) -> Result<(), LedgerError> {
    if owner == actor {
        Ok(())
    } else {
        Err(revert("You are not the owner or the governance timelock"))
    }
}

impl Ledger for LocalChain {
    fn instantiate(
        &mut self,
        artifact: &str,
        _args: &[Value],
        actor: &Address,
    ) -> Result<Address, LedgerError> {
        self.check_signer(actor)?;
        if self.failing_artifacts.contains(artifact) {
            return Err(revert(format!("{} constructor reverted", artifact)));
        }
        let address = self.create_contract(artifact, actor);
        let block = self.block();
        self.transactions.push(Transaction::Instantiate {
            artifact: artifact.to_string(),
            address: address.clone(),
            from: actor.clone(),
            block,
        });
        Ok(address)
    }

    fn call(
        &mut self,
        target: &Address,
        method: &str,
        args: &[Value],
        actor: &Address,
    ) -> Result<Receipt, LedgerError> {
        self.check_signer(actor)?;
        if self.failing_methods.contains(method) {
            return Err(revert(format!("{} reverted", method)));
        }

        let Contract {
            artifact,
            owner,
            state,
        } = self
            .contracts
            .get_mut(target)
            .ok_or_else(|| revert(format!("call to non-contract {}", target)))?;
        let mut created_pair = None;
        match (state, method) {
            (ContractState::Factory { pairs }, methods::CREATE_PAIR) => {
                let a = address_arg(method, args, 0)?;
                let b = address_arg(method, args, 1)?;
                if a == b {
                    return Err(revert("UniswapV2: IDENTICAL_ADDRESSES"));
                }
                if a.is_zero() || b.is_zero() {
                    return Err(revert("UniswapV2: ZERO_ADDRESS"));
                }
                let key = pair_key(a, b);
                if pairs.contains_key(&key) {
                    return Err(revert("UniswapV2: PAIR_EXISTS"));
                }
                created_pair = Some(key);
            }
            (ContractState::StableToken { pools }, methods::ADD_POOL) => {
                only_owner(owner, actor)?;
                let pool = address_arg(method, args, 0)?;
                if pools.contains(pool) {
                    return Err(revert("Address already exists"));
                }
                pools.push(pool.clone());
            }
            (ContractState::ShareToken { stable }, methods::SET_FRAX_ADDRESS) => {
                only_owner(owner, actor)?;
                *stable = address_arg(method, args, 0)?.clone();
            }
            (ContractState::Staking { initialized }, methods::INITIALIZE_DEFAULT) => {
                only_owner(owner, actor)?;
                if *initialized {
                    return Err(revert("Staking already initialized"));
                }
                *initialized = true;
            }
            _ => return Err(revert(format!("{} has no method {}", artifact, method))),
        }

        if let Some(key) = created_pair {
            let pair = self.create_contract(PAIR_ARTIFACT, target);
            if let Some(ContractState::Factory { pairs }) =
                self.contracts.get_mut(target).map(|c| &mut c.state)
            {
                pairs.insert(key, pair);
            }
        }

        let block = self.block();
        self.transactions.push(Transaction::Call {
            target: target.clone(),
            method: method.to_string(),
            from: actor.clone(),
            block,
        });
        Ok(self.receipt(block))
    }

    fn read(&self, target: &Address, method: &str, args: &[Value]) -> Result<Value, LedgerError> {
        self.reads.set(self.reads.get() + 1);
        let contract = self
            .contracts
            .get(target)
            .ok_or_else(|| revert(format!("read from non-contract {}", target)))?;
        match (&contract.state, method) {
            (ContractState::Factory { pairs }, methods::GET_PAIR) => {
                let key = pair_key(address_arg(method, args, 0)?, address_arg(method, args, 1)?);
                Ok(Value::Address(
                    pairs.get(&key).cloned().unwrap_or_else(Address::zero),
                ))
            }
            (ContractState::StableToken { pools }, methods::IS_POOL) => {
                let pool = address_arg(method, args, 0)?;
                Ok(Value::Bool(pools.contains(pool)))
            }
            (ContractState::ShareToken { stable }, methods::FRAX_ADDRESS) => {
                Ok(Value::Address(stable.clone()))
            }
            (ContractState::Staking { initialized }, methods::IS_INITIALIZED) => {
                Ok(Value::Bool(*initialized))
            }
            _ => Err(revert(format!(
                "{} has no view {}",
                contract.artifact, method
            ))),
        }
    }
}
