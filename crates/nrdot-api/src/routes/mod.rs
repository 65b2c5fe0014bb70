// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Route handler modules, one per endpoint group.

pub mod config;
pub mod discovery;
pub mod metrics;
pub mod reload;
pub mod status;
