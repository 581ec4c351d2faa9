// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Install the process subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(format: LogFormat) -> Result<()> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);

	match format {
		LogFormat::Json => registry
			.with(
				fmt::layer()
					.json()
					.with_current_span(true)
					.with_writer(std::io::stderr),
			)
			.try_init(),
		LogFormat::Pretty => registry
			.with(fmt::layer().pretty().with_writer(std::io::stderr))
			.try_init(),
	}
	.context("failed to install tracing subscriber")
}
