// `serena tiers`: print the tier limits table.

use colored::Colorize;
use serena_core::{Quota, Tier, TierLimits};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!(
        "{:<10} {:>10} {:>10}  {}",
        "TIER".bold(),
        "RECIPES".bold(),
        "AUDIO".bold(),
        "INCLUDES".bold()
    );
    for tier in Tier::ALL {
        let limits = TierLimits::for_tier(tier);
        println!(
            "{:<10} {:>10} {:>10}  {}",
            tier.as_str().cyan(),
            quota_label(limits.recipes_per_month),
            quota_label(limits.audio_per_month),
            capabilities(&limits).join(", ").dimmed()
        );
    }
    println!();
    Ok(())
}

fn quota_label(quota: Quota) -> String {
    match quota {
        Quota::Unlimited => "unlimited".to_string(),
        Quota::Monthly(n) => format!("{n}/month"),
    }
}

fn capabilities(limits: &TierLimits) -> Vec<&'static str> {
    [
        (limits.has_breathing_full, "breathing_full"),
        (limits.has_audio_library, "audio_library"),
        (limits.has_ai_coach, "ai_coach"),
        (limits.has_community_access, "community"),
        (limits.has_advanced_stats, "advanced_stats"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_labels() {
        assert_eq!(quota_label(Quota::Unlimited), "unlimited");
        assert_eq!(quota_label(Quota::Monthly(5)), "5/month");
    }

    #[test]
    fn test_free_has_no_capabilities() {
        assert!(capabilities(&TierLimits::for_tier(Tier::Free)).is_empty());
        assert_eq!(capabilities(&TierLimits::for_tier(Tier::Premium)).len(), 5);
    }
}
