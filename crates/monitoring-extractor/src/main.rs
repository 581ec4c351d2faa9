// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use monitoring_extractor::{config::Args, logging, ExtractError, Extractor};
use monitoring_k8s::KubeClient;

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	if let Err(e) = logging::init_tracing(args.log_format) {
		eprintln!("{e:#}");
		return ExitCode::FAILURE;
	}

	let cancel = CancellationToken::new();
	let on_signal = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!("Interrupt received, cancelling extraction");
			on_signal.cancel();
		}
	});

	match run(&args, &cancel).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!(kind = err.kind(), error = %err, "Extraction failed");
			ExitCode::FAILURE
		}
	}
}

async fn run(args: &Args, cancel: &CancellationToken) -> Result<(), ExtractError> {
	let client = KubeClient::open(&args.session_options())
		.await
		.map_err(ExtractError::Auth)?;

	let request = args.extract_request();
	Extractor::new(Arc::new(client))
		.run(&request, cancel)
		.await
		.map(|_| ())
}
