//! Fixed names shared across the pipeline.

/// Project descriptor, relative to the project root.
pub const DESCRIPTOR_FILENAME: &str = "pyproject.toml";

/// Lockfile, relative to the project root.
pub const LOCK_FILENAME: &str = "packwright.lock";

/// Build configuration candidates, searched in order.
pub const CONFIG_FILENAMES: &[&str] = &["packwright.toml", ".packwright.toml"];

/// Default extension manifest, relative to the project root.
pub const PLUGIN_MANIFEST: &str = ".packwright/builders.toml";

/// Default output directory, relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Prefix of every sandbox directory.
pub const SANDBOX_PREFIX: &str = "packwright-sandbox-";

/// Default interpreter used to bootstrap sandbox toolchains.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Environment variable overriding the sandbox interpreter.
pub const ENV_PYTHON: &str = "PACKWRIGHT_PYTHON";

/// Environment variable overriding the sandbox base directory.
pub const ENV_SANDBOX_DIR: &str = "PACKWRIGHT_SANDBOX_DIR";

/// January 1, 1980 00:00:00 UTC (ZIP epoch), exported as SOURCE_DATE_EPOCH.
pub const SOURCE_DATE_EPOCH: &str = "315532800";
