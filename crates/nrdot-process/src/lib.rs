// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Process telemetry reader.
//!
//! Parses `/proc` into ranked [`nrdot_types::ProcessFact`]s on each scan.
//! The reader holds no long-lived state of its own beyond the
//! [`CpuTickCache`] callers thread between scans — it never spawns
//! background tasks.

pub mod error;
pub mod incremental;
pub mod reader;

pub use error::{ProcessError, ReadError};
pub use incremental::{classify, DeltaKind, DeltaThresholds, ProcessDelta};
pub use reader::{read_single, scan, scan_with_deadline, scan_with_errors, CpuTickCache};
