//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with the streaming transport.

/// Port interfaces for external systems (stream transport).
pub mod ports;

/// Application services for the wallet stream and update notifications.
pub mod services;
