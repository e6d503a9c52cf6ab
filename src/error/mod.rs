// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////


//! # Vault Error Module
//!
//! This module provides the error types for the vault codec, implementing a
//! structured error handling approach that enumerates every failure scenario
//! a KeePass 1.x vault can produce.
//!
//! ## Overview
//!
//! The error module defines domain-specific errors that:
//!
//! - **Express Codec Failures**: Wire-format violations, truncation, and
//!   integrity failures
//! - **Express Key Failures**: Missing or wrong credentials, keyfile problems
//! - **Express Usage Failures**: Invalid arguments and invalid object handles
//! - **Maintain Type Safety**: One closed enum, one variant per failure kind
//! - **Support Error Translation**: Clean conversion from `std::io::Error`
//!
//! ## Error Handling Patterns
//!
//! Errors raised deep in the codec propagate unchanged to the caller via the
//! `?` operator; no layer swallows or rewraps them.

mod vault_error;

pub use vault_error::VaultError;
