//! # client-backup
//!
//! Per-client backup tool: dumps a MySQL database, copies a working directory and packs both
//! into one timestamped zip archive.
//!
//! ## Pipeline
//!
//! - **Staging**: `{backup_dir}/{client}_{timestamp}/` is created (or reused) under a run lock
//! - **Dump**: the external dump tool writes `{client}_{timestamp}.sql`, exit status checked,
//!   bounded by a timeout
//! - **Tree copy**: the working directory is copied to `{client}/`, symlinks kept as links
//! - **Compression**: timestamps reset to 1980-01-01, everything deflated into
//!   `{backup_dir}/{client}_{timestamp}.zip`, staging removed
//!
//! Any failing stage stops the run and leaves the staging directory in place.
//!
//! ## Quick Start
//!
//! ```no_run
//! use client_backup::backup::client_config;
//! use client_backup::backup::run::{BackupRun, RunTimestamp};
//!
//! let profile = client_config::resolve("settings.yml", "acme")?;
//! let archive = BackupRun::new(&profile, RunTimestamp::now()).execute()?;
//! println!("{}", archive.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
