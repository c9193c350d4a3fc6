// EVMPG - EVM Playground
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Hardfork catalog
//!
//! The playground lets the user pick the hardfork the engine runs with. This
//! module lists the selectable forks in activation order and maps each display
//! name to the revm [`SpecId`] the engine is configured with.

use std::{fmt, str::FromStr};

use revm::primitives::hardfork::SpecId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A selectable hardfork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hardfork {
    name: &'static str,
    spec_id: SpecId,
}

/// Selectable hardforks in activation order.
///
/// Constantinople is omitted: Petersburg replaced it at the same block height.
static HARDFORKS: &[Hardfork] = &[
    Hardfork::new("Frontier", SpecId::FRONTIER),
    Hardfork::new("Homestead", SpecId::HOMESTEAD),
    Hardfork::new("Tangerine Whistle", SpecId::TANGERINE),
    Hardfork::new("Spurious Dragon", SpecId::SPURIOUS_DRAGON),
    Hardfork::new("Byzantium", SpecId::BYZANTIUM),
    Hardfork::new("Petersburg", SpecId::PETERSBURG),
    Hardfork::new("Istanbul", SpecId::ISTANBUL),
    Hardfork::new("Berlin", SpecId::BERLIN),
    Hardfork::new("London", SpecId::LONDON),
    Hardfork::new("Merge", SpecId::MERGE),
    Hardfork::new("Shanghai", SpecId::SHANGHAI),
    Hardfork::new("Cancun", SpecId::CANCUN),
    Hardfork::new("Prague", SpecId::PRAGUE),
    Hardfork::new("Osaka", SpecId::OSAKA),
];

/// Error returned when a fork name is not in the catalog
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown hardfork `{0}`")]
pub struct UnknownHardfork(pub String);

impl Hardfork {
    const fn new(name: &'static str, spec_id: SpecId) -> Self {
        Self { name, spec_id }
    }

    /// All selectable hardforks, oldest first
    pub fn all() -> &'static [Self] {
        HARDFORKS
    }

    /// The most recent selectable hardfork
    pub fn latest() -> Self {
        HARDFORKS[HARDFORKS.len() - 1]
    }

    /// Look up a hardfork by name.
    ///
    /// Matching ignores case, spaces, dashes and underscores, so `tangerine-whistle`,
    /// `TangerineWhistle` and `Tangerine Whistle` all resolve to the same fork.
    /// `paris` is accepted as an alias of the Merge.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_name(name);
        if wanted == "paris" {
            return Self::from_spec_id(SpecId::MERGE);
        }
        HARDFORKS.iter().copied().find(|fork| normalize_name(fork.name) == wanted)
    }

    /// Look up the catalog entry for a revm specification id
    pub fn from_spec_id(spec_id: SpecId) -> Option<Self> {
        HARDFORKS.iter().copied().find(|fork| fork.spec_id == spec_id)
    }

    /// Display name of the fork
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// revm specification id the engine runs with
    pub fn spec_id(&self) -> SpecId {
        self.spec_id
    }

    /// Whether this fork includes the rules of `other`
    pub fn is_enabled_in(&self, other: SpecId) -> bool {
        self.spec_id.is_enabled_in(other)
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl Default for Hardfork {
    fn default() -> Self {
        Self::from_spec_id(SpecId::PRAGUE).unwrap_or_else(Self::latest)
    }
}

impl fmt::Display for Hardfork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for Hardfork {
    type Err = UnknownHardfork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownHardfork(s.to_string()))
    }
}

impl Serialize for Hardfork {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

impl<'de> Deserialize<'de> for Hardfork {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_in_activation_order() {
        let forks = Hardfork::all();
        for pair in forks.windows(2) {
            assert!(pair[0].spec_id() < pair[1].spec_id());
        }
        assert_eq!(Hardfork::latest().spec_id(), SpecId::OSAKA);
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Hardfork::from_name("cancun").map(|f| f.spec_id()), Some(SpecId::CANCUN));
        assert_eq!(
            Hardfork::from_name("tangerine-whistle").map(|f| f.spec_id()),
            Some(SpecId::TANGERINE)
        );
        assert_eq!(
            Hardfork::from_name("SpuriousDragon").map(|f| f.spec_id()),
            Some(SpecId::SPURIOUS_DRAGON)
        );
        assert_eq!(Hardfork::from_name("paris").map(|f| f.spec_id()), Some(SpecId::MERGE));
        assert!(Hardfork::from_name("constantinople").is_none());
        assert!("atlantis".parse::<Hardfork>().is_err());
    }

    #[test]
    fn test_default_and_enabled() {
        let fork = Hardfork::default();
        assert_eq!(fork.name(), "Prague");
        assert!(fork.is_enabled_in(SpecId::CANCUN));
        assert!(!Hardfork::from_name("london").unwrap().is_enabled_in(SpecId::SHANGHAI));
    }

    #[test]
    fn test_serde_round_trip_by_name() {
        let fork = Hardfork::from_name("shanghai").unwrap();
        let json = serde_json::to_string(&fork).unwrap();
        assert_eq!(json, "\"Shanghai\"");
        let parsed: Hardfork = serde_json::from_str("\"berlin\"").unwrap();
        assert_eq!(parsed.spec_id(), SpecId::BERLIN);
    }
}
