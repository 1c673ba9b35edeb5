use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of an on-chain account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Wallet,
    Contract,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Wallet => "wallet",
            AccountType::Contract => "contract",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wallet" => Ok(AccountType::Wallet),
            "contract" => Ok(AccountType::Contract),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

/// Account known to the repository.
///
/// A `Contract` account never turns back into a `Wallet`; use
/// [`Account::merge_from`] when combining two views of the same address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub account_type: AccountType,
    /// Hash of the transaction that deployed the contract, if any.
    pub contract_tx: Option<H256>,
    /// Unix timestamp of the last observed activity.
    pub last_activity: Option<u64>,
}

impl Account {
    /// Minimal record for an address nothing else is known about.
    pub fn stub(address: Address) -> Self {
        Self {
            address,
            account_type: AccountType::Wallet,
            contract_tx: None,
            last_activity: None,
        }
    }

    pub fn contract(address: Address, contract_tx: H256) -> Self {
        Self {
            address,
            account_type: AccountType::Contract,
            contract_tx: Some(contract_tx),
            last_activity: None,
        }
    }

    pub fn is_contract(&self) -> bool {
        self.account_type == AccountType::Contract
    }

    /// Attach contract creation evidence, promoting the account to a contract.
    pub fn with_contract_tx(mut self, tx: H256) -> Self {
        self.account_type = AccountType::Contract;
        self.contract_tx = Some(tx);
        self
    }

    /// Fold a newer view of the same account into this one.
    ///
    /// Contract classification and creation evidence are sticky, activity only
    /// moves forward.
    pub fn merge_from(&mut self, other: &Account) {
        if other.is_contract() {
            self.account_type = AccountType::Contract;
        }
        if self.contract_tx.is_none() {
            self.contract_tx = other.contract_tx;
        }
        self.last_activity = match (self.last_activity, other.last_activity) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// One page of transaction hashes for an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHashList {
    pub hashes: Vec<H256>,
    /// Opaque token for the next page; `None` on the last page.
    pub cursor: Option<String>,
    /// Total number of transactions recorded for the account.
    pub total: u64,
    pub has_more: bool,
}
