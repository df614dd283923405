use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A single denomination amount.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Denominations are 3-16 chars, lowercase alphanumeric, starting with a letter.
pub fn validate_denom(denom: &str) -> Result<(), TypeError> {
    let ok = (3..=16).contains(&denom.len())
        && denom.starts_with(|c: char| c.is_ascii_lowercase())
        && denom
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(TypeError::InvalidCoin(format!("invalid denom: {denom:?}")))
    }
}

impl FromStr for Coin {
    type Err = TypeError;

    /// Parse `"<amount><denom>"`, e.g. `"1000ustake"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| TypeError::InvalidCoin(format!("missing denom in {s:?}")))?;
        let (amount, denom) = s.split_at(split);
        if amount.is_empty() {
            return Err(TypeError::InvalidCoin(format!("missing amount in {s:?}")));
        }
        let amount = amount
            .parse::<u128>()
            .map_err(|e| TypeError::InvalidCoin(format!("{s:?}: {e}")))?;
        validate_denom(denom)?;
        Ok(Coin::new(denom, amount))
    }
}

/// A normalized multi-denomination amount.
///
/// Invariants: sorted by denom, denoms unique, no zero amounts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Build a normalized set; duplicate denoms are summed, zeros dropped.
    pub fn new(coins: impl IntoIterator<Item = Coin>) -> Self {
        let mut merged: BTreeMap<String, u128> = BTreeMap::new();
        for coin in coins {
            let entry = merged.entry(coin.denom).or_default();
            *entry = entry.saturating_add(coin.amount);
        }
        Self(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn single(denom: impl Into<String>, amount: u128) -> Self {
        Self::new([Coin::new(denom, amount)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    pub fn plus(&self, other: &Coins) -> Coins {
        Coins::new(self.0.iter().chain(other.0.iter()).cloned())
    }

    /// Subtract `other`; `None` if any denom would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut merged: BTreeMap<String, u128> = self
            .0
            .iter()
            .map(|c| (c.denom.clone(), c.amount))
            .collect();
        for coin in &other.0 {
            let have = merged.get(&coin.denom).copied().unwrap_or(0);
            merged.insert(coin.denom.clone(), have.checked_sub(coin.amount)?);
        }
        Some(Coins::new(
            merged.into_iter().map(|(denom, amount)| Coin { denom, amount }),
        ))
    }

    /// `true` if every denom in `other` is covered by `self`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other
            .0
            .iter()
            .all(|coin| self.amount_of(&coin.denom) >= coin.amount)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        for coin in &self.0 {
            validate_denom(&coin.denom)?;
        }
        Ok(())
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(coins: Vec<Coin>) -> Self {
        Coins::new(coins)
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins.0
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Coin::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for Coins {
    type Err = TypeError;

    /// Parse a comma-separated list, e.g. `"100ustake,5uiris"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Coins::empty());
        }
        let coins = s
            .split(',')
            .map(str::parse::<Coin>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Coins::new(coins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_coin() {
        let coin: Coin = "1000ustake".parse().unwrap();
        assert_eq!(coin, Coin::new("ustake", 1000));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("ustake".parse::<Coin>().is_err());
        assert!("100".parse::<Coin>().is_err());
        assert!("100U".parse::<Coin>().is_err());
    }

    #[test]
    fn normalization_merges_and_sorts() {
        let coins = Coins::new([
            Coin::new("uiris", 5),
            Coin::new("ustake", 1),
            Coin::new("uiris", 7),
            Coin::new("uatom", 0),
        ]);
        assert_eq!(coins.to_string(), "12uiris,1ustake");
    }

    #[test]
    fn checked_sub_refuses_negative() {
        let a: Coins = "10uiris,5ustake".parse().unwrap();
        let b: Coins = "3uiris".parse().unwrap();
        assert_eq!(a.checked_sub(&b).unwrap().to_string(), "7uiris,5ustake");
        assert!(b.checked_sub(&a).is_none());
    }

    #[test]
    fn is_all_gte() {
        let a: Coins = "10uiris,5ustake".parse().unwrap();
        assert!(a.is_all_gte(&"10uiris".parse().unwrap()));
        assert!(!a.is_all_gte(&"6ustake".parse().unwrap()));
        assert!(a.is_all_gte(&Coins::empty()));
    }

    #[test]
    fn serde_normalizes_input() {
        let coins: Coins =
            serde_json::from_str(r#"[{"denom":"ustake","amount":2},{"denom":"uiris","amount":1}]"#)
                .unwrap();
        assert_eq!(coins.to_string(), "1uiris,2ustake");
    }
}
