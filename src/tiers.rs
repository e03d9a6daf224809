use std::fmt;

/// Account subscription tier. Stored in the `users.subscription_tier` column
/// as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    Premium,
    Enterprise,
}

impl SubscriptionTier {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(SubscriptionTier::Free),
            "premium" => Some(SubscriptionTier::Premium),
            "enterprise" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    pub fn is_paid(self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }

    pub fn label(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Premium => "Premium",
            SubscriptionTier::Enterprise => "Enterprise",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tiers() {
        assert_eq!(
            SubscriptionTier::from_str("premium"),
            Some(SubscriptionTier::Premium)
        );
        assert_eq!(
            SubscriptionTier::from_str(" Enterprise "),
            Some(SubscriptionTier::Enterprise)
        );
        assert_eq!(SubscriptionTier::from_str("gold"), None);
    }

    #[test]
    fn free_is_not_paid() {
        assert!(!SubscriptionTier::Free.is_paid());
        assert!(SubscriptionTier::Premium.is_paid());
    }
}
