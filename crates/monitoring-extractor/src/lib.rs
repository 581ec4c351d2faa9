// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cold extraction of OpenTelemetry Collector signal files.
//!
//! A run mounts the collector's volume claim in a throwaway pod, streams
//! `tar cf - -C /data .` back over the exec channel, and unpacks it into a
//! local directory. The pod is deleted on every exit path.

pub mod config;
pub mod error;
pub mod exec;
pub mod extractor;
pub mod logging;
pub mod readiness;
pub mod unpack;
pub mod workload;

pub use error::ExtractError;
pub use extractor::{ExtractReport, ExtractRequest, Extractor};
pub use readiness::{ReadinessPolicy, WorkloadStatus};
pub use unpack::{ArchiveError, UnpackSummary};
pub use workload::{Workload, WorkloadSpec};
