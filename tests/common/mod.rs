//! Common test utilities for dardar-atm.
//!
//! This module provides shared fixtures and assertions for the integration tests.

#![allow(dead_code)]

pub mod assertions;
pub mod test_data;
