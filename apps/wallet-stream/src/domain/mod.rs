//! Domain Layer - Core ledger stream types and business logic.
//!
//! This layer contains the display model, the classifier that produces it,
//! and the per-category subscription bookkeeping. Nothing here performs I/O.

/// Raw ledger event classification into display items.
pub mod classifier;

/// Display items and the identity-keyed item store.
pub mod item;

/// Stream categories, stream options, and per-category subscription slots.
pub mod subscription;
