//! Ledger Record Shapes
//!
//! Field sets the classifier presence-checks on raw ledger records. Only the
//! fields needed to build a display item are declared; everything else in
//! the record is ignored.
//!
//! # References
//!
//! - [Operations](https://developers.stellar.org/docs/data/apis/horizon/api-reference/resources/operations)

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

// =============================================================================
// Raw Event
// =============================================================================

/// A record pushed by the stream transport, not yet classified.
///
/// Holds the operation-level record and, when the transport delivers it
/// separately, the containing transaction envelope. Without a separate
/// envelope the operation record carries its own envelope fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    operation: Value,
    envelope: Option<Value>,
}

impl RawEvent {
    /// Wrap a record that carries its own envelope fields.
    #[must_use]
    pub const fn from_record(record: Value) -> Self {
        Self {
            operation: record,
            envelope: None,
        }
    }

    /// Wrap an operation record together with its transaction envelope.
    #[must_use]
    pub const fn with_envelope(operation: Value, envelope: Value) -> Self {
        Self {
            operation,
            envelope: Some(envelope),
        }
    }

    /// The operation-level record.
    #[must_use]
    pub const fn operation(&self) -> &Value {
        &self.operation
    }

    /// The record the envelope fields are read from.
    #[must_use]
    pub fn envelope(&self) -> &Value {
        self.envelope.as_ref().unwrap_or(&self.operation)
    }

    /// The declared operation type, if any.
    #[must_use]
    pub fn kind_name(&self) -> Option<&str> {
        self.operation.get("type").and_then(Value::as_str)
    }
}

// =============================================================================
// Operation Kind
// =============================================================================

/// Ledger operation kinds the classifier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Direct payment.
    Payment,
    /// Payment routed through an asset path.
    PaymentPath,
    /// Account creation with a starting balance.
    CreateAccount,
    /// Account merge into another account.
    AccountMerge,
    /// Offer placement or update.
    ManageOffer,
    /// Trustline change.
    ChangeTrust,
    /// Account option change.
    SetOptions,
    /// Trustline authorization.
    AllowTrust,
    /// Account data entry change.
    ManageData,
}

impl OperationKind {
    /// Parse the record's `type` field.
    ///
    /// Accepts both the legacy names and the names used after the ledger
    /// protocol split path payments and offers into strict variants.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        let kind = match name {
            "payment" => Self::Payment,
            "payment_path"
            | "path_payment"
            | "path_payment_strict_receive"
            | "path_payment_strict_send" => Self::PaymentPath,
            "create_account" => Self::CreateAccount,
            "account_merge" => Self::AccountMerge,
            "manage_offer" | "manage_sell_offer" | "manage_buy_offer" => Self::ManageOffer,
            "change_trust" => Self::ChangeTrust,
            "set_options" => Self::SetOptions,
            "allow_trust" => Self::AllowTrust,
            "manage_data" => Self::ManageData,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::PaymentPath => "payment_path",
            Self::CreateAccount => "create_account",
            Self::AccountMerge => "account_merge",
            Self::ManageOffer => "manage_offer",
            Self::ChangeTrust => "change_trust",
            Self::SetOptions => "set_options",
            Self::AllowTrust => "allow_trust",
            Self::ManageData => "manage_data",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Fields merged into every item from the containing transaction record.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "id": "12884905985",
///   "created_at": "2024-03-15T12:00:00Z",
///   "_links": {"self": {"href": "https://horizon.stellar.org/operations/12884905985"}}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    /// Record id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Hypermedia links.
    #[serde(rename = "_links")]
    pub links: Links,
}

impl Envelope {
    /// Self-reference URL.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.links.self_link.href
    }
}

/// Hypermedia links of a record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Links {
    /// Link to the record itself.
    #[serde(rename = "self")]
    pub self_link: Link,
}

/// A single hypermedia link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Link {
    /// Target URL.
    pub href: String,
}

// =============================================================================
// Operation Records
// =============================================================================

/// Payment operation fields.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "type": "payment",
///   "asset_type": "credit_alphanum4",
///   "asset_code": "USD",
///   "from": "GA...",
///   "amount": "100.0000000"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    /// `native` or a credit asset type.
    pub asset_type: String,
    /// Asset code (absent for native).
    #[serde(default)]
    pub asset_code: Option<String>,
    /// Amount sent.
    pub amount: String,
    /// Sending account.
    #[serde(default)]
    pub from: Option<String>,
}

/// Path payment operation fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PathPaymentRecord {
    /// Destination asset type.
    pub asset_type: String,
    /// Destination asset code (absent for native).
    #[serde(default)]
    pub asset_code: Option<String>,
    /// Destination amount.
    pub amount: String,
    /// Source asset type.
    pub source_asset_type: String,
    /// Source asset code (absent for native).
    #[serde(default)]
    pub source_asset_code: Option<String>,
}

/// Create account operation fields.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRecord {
    /// Initial balance of the new account.
    pub starting_balance: String,
}

/// Manage offer operation fields.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "type": "manage_sell_offer",
///   "buying_asset_type": "native",
///   "selling_asset_type": "credit_alphanum4",
///   "selling_asset_code": "USD"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ManageOfferRecord {
    /// Asset type being bought.
    pub buying_asset_type: String,
    /// Asset code being bought (absent for native).
    #[serde(default)]
    pub buying_asset_code: Option<String>,
    /// Asset type being sold.
    pub selling_asset_type: String,
    /// Asset code being sold (absent for native).
    #[serde(default)]
    pub selling_asset_code: Option<String>,
}

/// Change trust and allow trust operation fields.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustRecord {
    /// Trusted asset type.
    pub asset_type: String,
    /// Trusted asset code (absent for native).
    #[serde(default)]
    pub asset_code: Option<String>,
}

/// Set options operation fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SetOptionsRecord {
    /// New inflation destination, when the operation sets one.
    #[serde(default)]
    pub inflation_dest: Option<String>,
}

/// Manage data operation fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ManageDataRecord {
    /// Data entry name.
    pub name: String,
    /// Data entry value (absent when the entry is deleted).
    #[serde(default)]
    pub value: Option<String>,
}
