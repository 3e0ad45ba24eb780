//! Bearer token table built from the `[[tokens]]` section.

use std::collections::{HashMap, HashSet};

use super::file::{Permission, TokenConfig};

/// The authenticated caller behind a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account: String,
    pub permission: Permission,
}

/// Token lookup plus the miner bindings of every account.
#[derive(Debug, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Principal>,
    bindings: HashMap<String, HashSet<String>>,
}

const ANY_MINER: &str = "*";

impl TokenTable {
    pub fn new(entries: Vec<TokenConfig>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table
                .bindings
                .entry(entry.account.clone())
                .or_default()
                .extend(entry.miners);
            table.tokens.insert(
                entry.token,
                Principal {
                    account: entry.account,
                    permission: entry.permission,
                },
            );
        }
        table
    }

    pub fn authenticate(&self, token: &str) -> Option<&Principal> {
        self.tokens.get(token)
    }

    /// Whether `account` may register workers for `miner`.
    pub fn is_bound(&self, account: &str, miner: &str) -> bool {
        self.bindings
            .get(account)
            .is_some_and(|miners| miners.contains(miner) || miners.contains(ANY_MINER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, account: &str, miners: &[&str]) -> TokenConfig {
        TokenConfig {
            token: token.to_owned(),
            account: account.to_owned(),
            permission: Permission::Write,
            miners: miners.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_bindings_merge_per_account() {
        let table = TokenTable::new(vec![
            entry("t1", "alice", &["f01000"]),
            entry("t2", "alice", &["f02000"]),
            entry("t3", "ops", &["*"]),
        ]);
        assert_eq!(table.authenticate("t2").unwrap().account, "alice");
        assert!(table.authenticate("nope").is_none());

        assert!(table.is_bound("alice", "f01000"));
        assert!(table.is_bound("alice", "f02000"));
        assert!(!table.is_bound("alice", "f03000"));
        assert!(table.is_bound("ops", "f03000"));
        assert!(!table.is_bound("mallory", "f01000"));
    }
}
