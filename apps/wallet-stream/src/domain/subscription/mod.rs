//! Subscription Slot Types
//!
//! Domain types for tracking which ledger stream categories hold a live
//! upstream subscription.
//!
//! # Design
//!
//! Each wallet stream may hold at most one subscription per category. The
//! slots are a fixed array indexed by [`StreamCategory`], so replacing a
//! slot always hands back the previous occupant for the caller to cancel.

use std::fmt;
use std::str::FromStr;

// =============================================================================
// Types
// =============================================================================

/// Account identifier (public key) a stream is scoped to.
pub type AccountId = String;

/// Kind of ledger activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamCategory {
    /// Payment operations (payment, path payment, create account, merge).
    Payments,
    /// Transaction records.
    Transactions,
    /// All operation records.
    Operations,
    /// Trades executed against the account's offers.
    Trades,
}

impl StreamCategory {
    /// Number of categories.
    pub const COUNT: usize = 4;

    /// Get all stream categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Payments,
            Self::Transactions,
            Self::Operations,
            Self::Trades,
        ]
    }

    /// Get the category name, which is also its endpoint path segment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Payments => "payments",
            Self::Transactions => "transactions",
            Self::Operations => "operations",
            Self::Trades => "trades",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Payments => 0,
            Self::Transactions => 1,
            Self::Operations => 2,
            Self::Trades => 3,
        }
    }
}

impl fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a category name is not one of the known streams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stream category: {0}")]
pub struct InvalidCategory(pub String);

impl FromStr for StreamCategory {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "payments" => Ok(Self::Payments),
            "transactions" => Ok(Self::Transactions),
            "operations" => Ok(Self::Operations),
            "trades" => Ok(Self::Trades),
            _ => Err(InvalidCategory(s.to_string())),
        }
    }
}

// =============================================================================
// Stream Options
// =============================================================================

/// Cursor value that positions a stream at the live edge.
pub const CURSOR_NOW: &str = "now";

/// Options requested from the transport when a stream opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Cap on the historical backlog replay (`None` = server default).
    pub limit: Option<u32>,
    /// Starting cursor (`None` = earliest available event).
    pub cursor: Option<String>,
}

impl StreamOptions {
    /// Build options from an item ceiling and the "begin from now" flag.
    ///
    /// A zero limit leaves the backlog uncapped.
    #[must_use]
    pub fn new(limit: u32, start_from_now: bool) -> Self {
        Self {
            limit: (limit > 0).then_some(limit),
            cursor: start_from_now.then(|| CURSOR_NOW.to_string()),
        }
    }

    /// Check whether the stream skips all historical events.
    #[must_use]
    pub fn is_live_only(&self) -> bool {
        self.cursor.as_deref() == Some(CURSOR_NOW)
    }
}

// =============================================================================
// Subscription Slots
// =============================================================================

/// One optional live handle per stream category.
#[derive(Debug)]
pub struct SubscriptionSlots<H> {
    slots: [Option<H>; StreamCategory::COUNT],
}

impl<H> Default for SubscriptionSlots<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SubscriptionSlots<H> {
    /// Create empty slots.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    /// Store a handle for a category.
    ///
    /// Returns the handle that previously held the slot, which the caller
    /// must cancel.
    #[must_use = "a replaced handle must be cancelled or its connection leaks"]
    pub fn replace(&mut self, category: StreamCategory, handle: H) -> Option<H> {
        self.slots[category.index()].replace(handle)
    }

    /// Remove and return the handle for a category.
    pub fn take(&mut self, category: StreamCategory) -> Option<H> {
        self.slots[category.index()].take()
    }

    /// Get the handle for a category.
    #[must_use]
    pub const fn get(&self, category: StreamCategory) -> Option<&H> {
        self.slots[category.index()].as_ref()
    }

    /// Check whether a category holds a live handle.
    #[must_use]
    pub const fn is_active(&self, category: StreamCategory) -> bool {
        self.slots[category.index()].is_some()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Remove every handle, returning them with their categories.
    pub fn drain(&mut self) -> Vec<(StreamCategory, H)> {
        StreamCategory::all()
            .iter()
            .filter_map(|category| self.take(*category).map(|handle| (*category, handle)))
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
