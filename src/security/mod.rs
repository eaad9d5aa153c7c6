// src/security/mod.rs
//! Helpers that keep secrets out of logs and error output.

// Redaction helpers to avoid accidental secret prints
pub mod redaction;
