use std::collections::HashSet;

/// Plain-text reply sent to senders outside the allowlist.
pub const LOCKED_MESSAGE: &str = "This bot is locked. Your Telegram user ID is not allowed.";

/// Telegram user IDs permitted to talk to the bot.
///
/// An empty list lets everyone through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    ids: HashSet<u64>,
}

impl Allowlist {
    /// Parse comma-separated IDs. Entries that are not all ASCII digits are
    /// dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|s| s.parse().ok())
            .collect();
        Self { ids }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Determine if a sender may use the bot.
    pub fn check(&self, user_id: u64) -> Result<(), AccessDenied> {
        if self.ids.is_empty() || self.ids.contains(&user_id) {
            Ok(())
        } else {
            Err(AccessDenied::NotOnAllowlist)
        }
    }
}

/// Reason an inbound message was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    NotOnAllowlist,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOnAllowlist => write!(f, "user not on allowlist"),
        }
    }
}
