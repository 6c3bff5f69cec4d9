//! Configuration

use anyhow::{Context, Result};
use emo_core::{Identity, SumSeed};
use emo_merkle::MAX_TREE_DEPTH;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Default evaluator funding, one ether in wei
const DEFAULT_IDENTITY_BALANCE: u128 = 1_000_000_000_000_000_000;

/// Host configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Depth of both commitment trees, also the number of bisection rounds
    pub tree_depth: usize,
    /// Trace step bound, `None` for unbounded
    pub max_steps: Option<u64>,
    /// Seconds a party has to act before the other may claim a timeout
    pub dispute_timeout: u64,
    /// Seed handed to the machine
    pub seed: SumSeed,
    /// Whether the defendant commits to the correct trace
    pub defendant_honest: bool,
    /// Account the evaluator runs under
    pub identity: Identity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tree_depth: 16,
            max_steps: Some(1_000_000),
            dispute_timeout: 60,
            seed: SumSeed { nums: vec![1, 2, 3, 12, 55] },
            defendant_honest: true,
            identity: Identity { key: None, balance: DEFAULT_IDENTITY_BALANCE },
        }
    }
}

impl Config {
    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup; unset variables keep their default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let tree_depth = parse_or(&lookup, "TREE_DEPTH", defaults.tree_depth)?;
        if tree_depth == 0 || tree_depth > MAX_TREE_DEPTH {
            anyhow::bail!("TREE_DEPTH must be between 1 and {MAX_TREE_DEPTH}, got {tree_depth}");
        }

        let max_steps = match lookup("MAX_STEPS") {
            Some(value) => match parse::<u64>("MAX_STEPS", &value)? {
                0 => None,
                steps => Some(steps),
            },
            None => defaults.max_steps,
        };

        let seed = match lookup("SEED_NUMS") {
            Some(value) => SumSeed { nums: parse_nums(&value)? },
            None => defaults.seed,
        };

        let defendant_honest = match lookup("DEFENDANT_HONEST") {
            Some(value) => parse_bool("DEFENDANT_HONEST", &value)?,
            None => defaults.defendant_honest,
        };

        let identity = Identity {
            key: lookup("IDENTITY_KEY").filter(|key| !key.is_empty()),
            balance: parse_or(&lookup, "IDENTITY_BALANCE", defaults.identity.balance)?,
        };

        Ok(Self {
            tree_depth,
            max_steps,
            dispute_timeout: parse_or(&lookup, "DISPUTE_TIMEOUT", defaults.dispute_timeout)?,
            seed,
            defendant_honest,
            identity,
        })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().with_context(|| format!("invalid {key}: {value:?}"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key).map_or(Ok(default), |value| parse(key, &value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => anyhow::bail!("invalid {key}: {value:?}"),
    }
}

fn parse_nums(value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse("SEED_NUMS", part))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.tree_depth, 16);
        assert_eq!(config.max_steps, Some(1_000_000));
        assert_eq!(config.dispute_timeout, 60);
        assert_eq!(config.seed.nums, vec![1, 2, 3, 12, 55]);
        assert!(config.defendant_honest);
        assert_eq!(config.identity.key, None);
        assert_eq!(config.identity.balance, DEFAULT_IDENTITY_BALANCE);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("TREE_DEPTH", "3"),
            ("MAX_STEPS", "0"),
            ("SEED_NUMS", "4, 5,6"),
            ("DEFENDANT_HONEST", "false"),
            ("IDENTITY_KEY", "abc"),
            ("IDENTITY_BALANCE", "7"),
        ])
        .unwrap();

        assert_eq!(config.tree_depth, 3);
        assert_eq!(config.max_steps, None);
        assert_eq!(config.seed.nums, vec![4, 5, 6]);
        assert!(!config.defendant_honest);
        assert_eq!(config.identity.key.as_deref(), Some("abc"));
        assert_eq!(config.identity.balance, 7);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(load(&[("TREE_DEPTH", "sixteen")]).is_err());
        assert!(load(&[("TREE_DEPTH", "0")]).is_err());
        assert!(load(&[("TREE_DEPTH", "64")]).is_err());
        assert!(load(&[("DISPUTE_TIMEOUT", "-1")]).is_err());
        assert!(load(&[("SEED_NUMS", "1,x")]).is_err());
        assert!(load(&[("DEFENDANT_HONEST", "maybe")]).is_err());
    }
}
