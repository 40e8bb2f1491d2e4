//! Shared helpers for the KHU end-to-end and adversarial test suites.

pub mod helpers;
