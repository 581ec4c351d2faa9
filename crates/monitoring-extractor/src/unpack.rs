// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tar stream unpacking into a local directory.
//!
//! Only directories and regular files are materialized. Everything else
//! (symlinks, hard links, devices, fifos) is skipped. Entries may arrive in
//! any order, so parents are created on demand for every file.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, EntryType};
use tracing::debug;

const DIR_MODE: u32 = 0o755;

/// Errors raised while unpacking an archive stream.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
	/// Header or stream could not be parsed
	#[error("Malformed archive: {0}")]
	Malformed(#[source] io::Error),

	/// Entry path would land outside the destination
	#[error("Refusing to unpack entry outside destination: {path}")]
	UnsafePath { path: String },

	/// Stream ended inside an entry's content
	#[error("Truncated entry {path}: expected {expected} bytes, got {actual}")]
	Truncated {
		path: PathBuf,
		expected: u64,
		actual: u64,
	},

	/// Local filesystem write failed
	#[error("Failed to write {path}: {source}")]
	Write {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	/// The unpacking task stopped before finishing
	#[error("Unpacking aborted: {0}")]
	Aborted(String),
}

/// What a successful unpack produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackSummary {
	pub directories: u64,
	pub files: u64,
	pub skipped: u64,
	pub bytes: u64,
}

/// Unpack a tar stream under `destination`, creating it if needed.
///
/// Stops at the first malformed entry. After end-of-archive the rest of the
/// stream (record padding) is read and discarded, so the writer on the other
/// end never sees a closed pipe.
pub fn unpack<R: Read>(mut reader: R, destination: &Path) -> Result<UnpackSummary, ArchiveError> {
	create_dir_all(destination)?;

	let summary = unpack_entries(Archive::new(&mut reader), destination)?;

	let trailing = io::copy(&mut reader, &mut io::sink()).map_err(ArchiveError::Malformed)?;
	if trailing > 0 {
		debug!(bytes = trailing, "Discarded trailing archive padding");
	}

	Ok(summary)
}

fn unpack_entries<R: Read>(
	mut archive: Archive<R>,
	destination: &Path,
) -> Result<UnpackSummary, ArchiveError> {
	let mut summary = UnpackSummary::default();

	for entry in archive.entries().map_err(ArchiveError::Malformed)? {
		let mut entry = entry.map_err(ArchiveError::Malformed)?;
		let entry_type = entry.header().entry_type();
		let raw_path = entry.path().map_err(ArchiveError::Malformed)?.into_owned();

		match entry_type {
			EntryType::Directory => {
				let target = resolve_entry_path(destination, &raw_path)?;
				create_dir_all(&target)?;
				summary.directories += 1;
			}
			EntryType::Regular | EntryType::Continuous => {
				let target = resolve_entry_path(destination, &raw_path)?;
				if let Some(parent) = target.parent() {
					create_dir_all(parent)?;
				}

				let expected = entry.size();
				let mut file = File::create(&target).map_err(|source| ArchiveError::Write {
					path: target.clone(),
					source,
				})?;
				let actual = io::copy(&mut entry, &mut file).map_err(|source| ArchiveError::Write {
					path: target.clone(),
					source,
				})?;
				if actual != expected {
					return Err(ArchiveError::Truncated {
						path: target,
						expected,
						actual,
					});
				}

				debug!(path = %target.display(), bytes = actual, "Wrote file");
				summary.files += 1;
				summary.bytes += actual;
			}
			other => {
				debug!(path = %raw_path.display(), entry_type = ?other, "Skipping unsupported entry");
				summary.skipped += 1;
			}
		}
	}

	Ok(summary)
}

/// Join an archive entry path onto `root`, rejecting anything that could
/// escape it.
///
/// `.` components are dropped. Parent, root and prefix components are
/// rejected rather than clamped.
pub fn resolve_entry_path(root: &Path, entry_path: &Path) -> Result<PathBuf, ArchiveError> {
	let mut resolved = root.to_path_buf();
	for component in entry_path.components() {
		match component {
			Component::Normal(part) => resolved.push(part),
			Component::CurDir => {}
			Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
				return Err(ArchiveError::UnsafePath {
					path: entry_path.display().to_string(),
				});
			}
		}
	}
	Ok(resolved)
}

fn create_dir_all(path: &Path) -> Result<(), ArchiveError> {
	let mut builder = fs::DirBuilder::new();
	builder.recursive(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::DirBuilderExt;
		builder.mode(DIR_MODE);
	}
	builder.create(path).map_err(|source| ArchiveError::Write {
		path: path.to_path_buf(),
		source,
	})
}
