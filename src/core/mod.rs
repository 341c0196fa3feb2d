//! core
//!
//! Core domain types, naming rules, configuration and pipeline files.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Sha, FileMode, ObjectType
//! - [`naming`] - Ref qualification rules for create vs update
//! - [`config`] - Configuration schema and loading
//! - [`manifest`] - Declarative pipeline files
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod manifest;
pub mod naming;
pub mod types;
