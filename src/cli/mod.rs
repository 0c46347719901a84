//! # CLI Module
//!
//! Text console support layered over the link.
//!
//! This module handles:
//! - Correlating CLI requests with their output (prompt detection, timeout)
//! - Cleaning captured output (trailing prompt, command echo)
//! - Splitting `name = value` output into settings

pub mod capture;
pub mod settings;
