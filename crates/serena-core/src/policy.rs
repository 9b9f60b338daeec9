//! Tier policy table.
//!
//! Static mapping from subscription tier to per-feature monthly quotas and
//! capability flags. Pure data; nothing here touches storage.
//!
//! | Tier    | Recipes/mo | Audio/mo | AI coach | Community | Adv. stats | Breathing | Audio library |
//! |---------|-----------:|---------:|:--------:|:---------:|:----------:|:---------:|:-------------:|
//! | FREE    | 5          | 0        | no       | no        | no         | no        | no            |
//! | BASIC   | 50         | 10       | no       | no        | no         | yes       | yes           |
//! | PREMIUM | unlimited  | unlimited| yes      | yes       | yes        | yes       | yes           |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Subscription tier. Declaration order is the tier total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Basic,
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Basic, Tier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Basic => "BASIC",
            Tier::Premium => "PREMIUM",
        }
    }

    /// Tiers strictly above this one, lowest first.
    pub fn above(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |t| *t > self)
    }

    /// Whether this tier is sold through checkout.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    pub fn limits(&self) -> TierLimits {
        TierLimits::for_tier(*self)
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Tier::Free),
            "BASIC" => Ok(Tier::Basic),
            "PREMIUM" => Ok(Tier::Premium),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Feature identifiers. Stable wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    GenerateRecipe,
    GenerateAudio,
    AiCoach,
    Community,
    AdvancedStats,
    BreathingFull,
    AudioLibrary,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::GenerateRecipe,
        Feature::GenerateAudio,
        Feature::AiCoach,
        Feature::Community,
        Feature::AdvancedStats,
        Feature::BreathingFull,
        Feature::AudioLibrary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::GenerateRecipe => "generate_recipe",
            Feature::GenerateAudio => "generate_audio",
            Feature::AiCoach => "ai_coach",
            Feature::Community => "community",
            Feature::AdvancedStats => "advanced_stats",
            Feature::BreathingFull => "breathing_full",
            Feature::AudioLibrary => "audio_library",
        }
    }

    /// The usage counter this feature consumes, if it is metered.
    pub fn countable(&self) -> Option<CountableFeature> {
        match self {
            Feature::GenerateRecipe => Some(CountableFeature::Recipe),
            Feature::GenerateAudio => Some(CountableFeature::Audio),
            Feature::AiCoach
            | Feature::Community
            | Feature::AdvancedStats
            | Feature::BreathingFull
            | Feature::AudioLibrary => None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown feature: {s}"))
    }
}

/// A feature with a monthly usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountableFeature {
    Recipe,
    Audio,
}

impl CountableFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountableFeature::Recipe => "recipe",
            CountableFeature::Audio => "audio",
        }
    }

    pub fn feature(&self) -> Feature {
        match self {
            CountableFeature::Recipe => Feature::GenerateRecipe,
            CountableFeature::Audio => Feature::GenerateAudio,
        }
    }
}

impl fmt::Display for CountableFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountableFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recipe" => Ok(CountableFeature::Recipe),
            "audio" => Ok(CountableFeature::Audio),
            other => Err(format!("invalid usage type: {other}")),
        }
    }
}

/// Monthly quota for a countable feature.
///
/// On the wire a quota is an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Unlimited,
    Monthly(u32),
}

impl Quota {
    pub const UNLIMITED_SENTINEL: i64 = -1;

    /// Whether one more use is allowed after `used` uses this month.
    pub fn allows(&self, used: u32) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Monthly(limit) => used < *limit,
        }
    }

    /// A zero quota means the feature is not offered at this tier at all.
    pub fn is_offered(&self) -> bool {
        !matches!(self, Quota::Monthly(0))
    }

    pub fn as_wire(&self) -> i64 {
        match self {
            Quota::Unlimited => Self::UNLIMITED_SENTINEL,
            Quota::Monthly(limit) => i64::from(*limit),
        }
    }

    /// Remaining uses this month, `-1` when unlimited.
    pub fn remaining(&self, used: u32) -> i64 {
        match self {
            Quota::Unlimited => Self::UNLIMITED_SENTINEL,
            Quota::Monthly(limit) => i64::from(limit.saturating_sub(used)),
        }
    }
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        match raw {
            Quota::UNLIMITED_SENTINEL => Ok(Quota::Unlimited),
            n if n >= 0 => u32::try_from(n)
                .map(Quota::Monthly)
                .map_err(serde::de::Error::custom),
            n => Err(serde::de::Error::custom(format!("invalid quota: {n}"))),
        }
    }
}

/// What a tier grants for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Metered(Quota),
    Capability(bool),
}

impl Allowance {
    /// Whether the allowance admits a use given `used` uses this month.
    pub fn admits(&self, used: u32) -> bool {
        match self {
            Allowance::Metered(quota) => quota.allows(used),
            Allowance::Capability(enabled) => *enabled,
        }
    }
}

/// Per-tier limits entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub recipes_per_month: Quota,
    pub audio_per_month: Quota,
    pub has_ai_coach: bool,
    pub has_community_access: bool,
    pub has_advanced_stats: bool,
    pub has_breathing_full: bool,
    pub has_audio_library: bool,
}

impl TierLimits {
    pub const fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                recipes_per_month: Quota::Monthly(5),
                audio_per_month: Quota::Monthly(0),
                has_ai_coach: false,
                has_community_access: false,
                has_advanced_stats: false,
                has_breathing_full: false,
                has_audio_library: false,
            },
            Tier::Basic => Self {
                recipes_per_month: Quota::Monthly(50),
                audio_per_month: Quota::Monthly(10),
                has_ai_coach: false,
                has_community_access: false,
                has_advanced_stats: false,
                has_breathing_full: true,
                has_audio_library: true,
            },
            Tier::Premium => Self {
                recipes_per_month: Quota::Unlimited,
                audio_per_month: Quota::Unlimited,
                has_ai_coach: true,
                has_community_access: true,
                has_advanced_stats: true,
                has_breathing_full: true,
                has_audio_library: true,
            },
        }
    }

    pub fn quota(&self, counter: CountableFeature) -> Quota {
        match counter {
            CountableFeature::Recipe => self.recipes_per_month,
            CountableFeature::Audio => self.audio_per_month,
        }
    }

    pub fn allowance(&self, feature: Feature) -> Allowance {
        match feature {
            Feature::GenerateRecipe => Allowance::Metered(self.recipes_per_month),
            Feature::GenerateAudio => Allowance::Metered(self.audio_per_month),
            Feature::AiCoach => Allowance::Capability(self.has_ai_coach),
            Feature::Community => Allowance::Capability(self.has_community_access),
            Feature::AdvancedStats => Allowance::Capability(self.has_advanced_stats),
            Feature::BreathingFull => Allowance::Capability(self.has_breathing_full),
            Feature::AudioLibrary => Allowance::Capability(self.has_audio_library),
        }
    }
}
