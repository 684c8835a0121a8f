//! Message envelope and enumerated types for the coordination bus
//!
//! Defines the single persisted entity (the message) together with its
//! type, status, and severity enumerations and field-level validation.

pub mod messages;

pub use messages::{
    validate_payload, Message, MessageStatus, MessageType, Severity,
};
