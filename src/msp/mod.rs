//! # MSP Protocol Module
//!
//! Implementation of the MultiWii Serial Protocol (MSP v1) polling link.
//!
//! This module handles:
//! - Request frame encoding (fixed 6-byte polls)
//! - Incremental response decoding from an arbitrarily chunked byte stream
//! - XOR checksum calculation
//! - Little-endian payload field accessors

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod checksum;
pub mod payload;
