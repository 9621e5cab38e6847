//! Event Classifier
//!
//! Maps a raw ledger record to a [`DisplayItem`]. Dispatch is on the closed
//! [`OperationKind`] set; anything else classifies as
//! [`Classification::Unrecognized`] and is dropped by the caller.
//!
//! # Naming Rules
//!
//! | Kind           | `name`                                | `value`                               |
//! |----------------|---------------------------------------|---------------------------------------|
//! | payment        | `Payment {asset}`                     | amount                                |
//! | payment path   | `Payment path{asset}/{source}`        | destination amount                    |
//! | create account | `Create Account`                      | starting balance                      |
//! | account merge  | `Account Merge`                       | `merging`                             |
//! | manage offer   | `Manage Offer`                        | `Selling: {s} Buying: {b}`            |
//! | change trust   | `Change Trust`                        | asset                                 |
//! | allow trust    | `Allow Trust`                         | asset                                 |
//! | set options    | `Set Options`                         | `Inflation dest = {dest}` / `unknown` |
//! | manage data    | `Manage Data`                         | `Name = {n} Value = {v}`              |
//!
//! Native assets render as `XLM`. Amounts have trailing zeros stripped.

mod records;

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

pub use records::{
    CreateAccountRecord, Envelope, Link, Links, ManageDataRecord, ManageOfferRecord,
    OperationKind, PathPaymentRecord, PaymentRecord, RawEvent, SetOptionsRecord, TrustRecord,
};

use super::item::DisplayItem;

/// Label used for the network's native asset.
pub const NATIVE_ASSET_LABEL: &str = "XLM";

const NATIVE_ASSET_TYPE: &str = "native";

// =============================================================================
// Errors
// =============================================================================

/// A recognized record that lacks fields the classifier needs.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Operation fields missing or of the wrong shape.
    #[error("malformed {kind} record: {source}")]
    Malformed {
        /// Operation kind being classified.
        kind: OperationKind,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A non-native asset without an asset code.
    #[error("{kind} record missing {field}")]
    MissingField {
        /// Operation kind being classified.
        kind: OperationKind,
        /// Name of the absent field.
        field: &'static str,
    },

    /// Envelope fields (`id`, `created_at`, `_links.self.href`) missing.
    #[error("malformed transaction envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

// =============================================================================
// Classification
// =============================================================================

/// Outcome of classifying a raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The event produced a display item.
    Item(DisplayItem),
    /// The event kind is outside the known set.
    Unrecognized {
        /// Declared type, if the record had one.
        kind: Option<String>,
    },
}

impl Classification {
    /// The produced item, if any.
    #[must_use]
    pub fn into_item(self) -> Option<DisplayItem> {
        match self {
            Self::Item(item) => Some(item),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Category-specific fields computed before the envelope merge.
struct Described {
    name: String,
    value: String,
    from: Option<String>,
    asset_code: Option<String>,
}

impl Described {
    const fn new(name: String, value: String) -> Self {
        Self {
            name,
            value,
            from: None,
            asset_code: None,
        }
    }

    fn into_item(self, envelope: Envelope) -> DisplayItem {
        let link = envelope.href().to_string();
        DisplayItem {
            id: envelope.id,
            name: self.name,
            value: self.value,
            from: self.from,
            asset_code: self.asset_code,
            link,
            date: envelope.created_at,
        }
    }
}

/// Classify a raw event.
///
/// # Errors
///
/// Returns an error if the event has a recognized kind but is missing the
/// operation or envelope fields that kind needs. Unrecognized kinds are not
/// errors.
pub fn classify(event: &RawEvent) -> Result<Classification, ClassifyError> {
    let Some(kind) = event.kind_name().and_then(OperationKind::from_wire) else {
        return Ok(Classification::Unrecognized {
            kind: event.kind_name().map(str::to_string),
        });
    };

    let described = describe(kind, event.operation())?;
    let envelope = Envelope::deserialize(event.envelope()).map_err(ClassifyError::Envelope)?;

    Ok(Classification::Item(described.into_item(envelope)))
}

fn describe(kind: OperationKind, record: &Value) -> Result<Described, ClassifyError> {
    match kind {
        OperationKind::Payment => {
            let payment: PaymentRecord = decode(kind, record)?;
            let asset = asset_label(
                kind,
                &payment.asset_type,
                payment.asset_code.as_deref(),
                "asset_code",
            )?;
            Ok(Described {
                from: payment.from,
                asset_code: payment.asset_code,
                ..Described::new(format!("Payment {asset}"), strip_zeros(&payment.amount))
            })
        }
        OperationKind::PaymentPath => {
            let path: PathPaymentRecord = decode(kind, record)?;
            let asset = asset_label(
                kind,
                &path.asset_type,
                path.asset_code.as_deref(),
                "asset_code",
            )?;
            let source = asset_label(
                kind,
                &path.source_asset_type,
                path.source_asset_code.as_deref(),
                "source_asset_code",
            )?;
            Ok(Described::new(
                format!("Payment path{asset}/{source}"),
                strip_zeros(&path.amount),
            ))
        }
        OperationKind::CreateAccount => {
            let create: CreateAccountRecord = decode(kind, record)?;
            Ok(Described::new(
                "Create Account".to_string(),
                strip_zeros(&create.starting_balance),
            ))
        }
        OperationKind::AccountMerge => Ok(Described::new(
            "Account Merge".to_string(),
            "merging".to_string(),
        )),
        OperationKind::ManageOffer => {
            let offer: ManageOfferRecord = decode(kind, record)?;
            let selling = asset_label(
                kind,
                &offer.selling_asset_type,
                offer.selling_asset_code.as_deref(),
                "selling_asset_code",
            )?;
            let buying = asset_label(
                kind,
                &offer.buying_asset_type,
                offer.buying_asset_code.as_deref(),
                "buying_asset_code",
            )?;
            Ok(Described::new(
                "Manage Offer".to_string(),
                format!("Selling: {selling} Buying: {buying}"),
            ))
        }
        OperationKind::ChangeTrust | OperationKind::AllowTrust => {
            let trust: TrustRecord = decode(kind, record)?;
            let asset = asset_label(
                kind,
                &trust.asset_type,
                trust.asset_code.as_deref(),
                "asset_code",
            )?;
            let name = if kind == OperationKind::ChangeTrust {
                "Change Trust"
            } else {
                "Allow Trust"
            };
            Ok(Described::new(name.to_string(), asset))
        }
        OperationKind::SetOptions => {
            let options: SetOptionsRecord = decode(kind, record)?;
            let value = match options.inflation_dest.as_deref() {
                Some(dest) if !dest.is_empty() => format!("Inflation dest = {dest}"),
                _ => "unknown".to_string(),
            };
            Ok(Described::new("Set Options".to_string(), value))
        }
        OperationKind::ManageData => {
            let data: ManageDataRecord = decode(kind, record)?;
            Ok(Described::new(
                "Manage Data".to_string(),
                format!(
                    "Name = {} Value = {}",
                    data.name,
                    data.value.unwrap_or_default()
                ),
            ))
        }
    }
}

fn decode<'de, T: Deserialize<'de>>(
    kind: OperationKind,
    record: &'de Value,
) -> Result<T, ClassifyError> {
    T::deserialize(record).map_err(|source| ClassifyError::Malformed { kind, source })
}

fn asset_label(
    kind: OperationKind,
    asset_type: &str,
    asset_code: Option<&str>,
    field: &'static str,
) -> Result<String, ClassifyError> {
    if asset_type == NATIVE_ASSET_TYPE {
        return Ok(NATIVE_ASSET_LABEL.to_string());
    }

    asset_code
        .map(str::to_string)
        .ok_or(ClassifyError::MissingField { kind, field })
}

// =============================================================================
// Amount Formatting
// =============================================================================

/// Strip trailing fractional zeros from a decimal amount string.
///
/// `"100.0000000"` becomes `"100"` and `"12.5000000"` becomes `"12.5"`.
/// Input that is not a plain decimal has its fraction trimmed textually.
#[must_use]
pub fn strip_zeros(amount: &str) -> String {
    let trimmed = amount.trim();

    match Decimal::from_str(trimmed) {
        Ok(decimal) => decimal.normalize().to_string(),
        Err(_) if trimmed.contains('.') => trimmed
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Err(_) => trimmed.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
