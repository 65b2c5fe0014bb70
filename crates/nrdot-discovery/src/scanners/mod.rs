// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! The four independent discovery scanners.

pub mod config_scanner;
pub mod package_scanner;
pub mod port_scanner;
pub mod process_scanner;
