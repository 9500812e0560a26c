//! Host-provided collaborators. The core only
//! consumes these through the `Host` trait; it never assumes a concrete
//! file system, platform, or logging backend, keeping the parser/analyzer
//! reusable by embedders with very different runtimes (bytecode VM, audio
//! driver bootstrap, CLI front end — all out of scope for this crate).

use std::fmt;

/// Opened-file view handed back by `Host::open_file`. The core only ever
/// needs the whole text; `size` is exposed for hosts that want to
/// pre-allocate.
pub struct OpenedFile {
    pub size: usize,
    pub contents: String,
}

#[derive(Debug)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HostError {}

/// State the host exposes for `@if` evaluation and general
/// diagnostics (`class_id_to_name`).
pub trait Host {
    /// Resolves a logical import name (`import 'lib'`) to a host file-system
    /// path. Does not read the file.
    fn resolve_path(&self, logical_name: &str) -> Result<String, HostError>;

    /// Reads the full contents of an already-resolved path.
    fn open_file(&self, path: &str) -> Result<OpenedFile, HostError>;

    /// Used by `@if (exists = "path")`.
    fn analyse_path(&self, path: &str) -> Result<(), HostError>;

    /// Used by `@if (platform = "name")`.
    fn platform(&self) -> &str;

    /// Used by `@if (debug = true|false)`.
    fn log_level(&self) -> u8;

    /// Maps an `Object` type's `class_id` back to a human-readable name for
    /// diagnostics.
    fn class_id_to_name(&self, class_id: u32) -> String;

    /// The host-defined threshold above which `check E` actually raises
    ///. Exposed rather than hard-coded so a
    /// reimplementation is free to choose its own constant.
    fn exception_threshold(&self) -> i64 {
        0
    }

    /// Host hook answering "is this runtime value empty" for `??` over
    /// reference types. The parser/analyzer
    /// never needs this — it is exposed purely so embedders have a single
    /// place to plug runtime semantics in; declared here so the contract is
    /// visible at the boundary this crate owns.
    fn is_empty(&self, _value: &dyn std::any::Any) -> bool {
        false
    }
}

/// A `Host` usable in tests and for compiling a single in-memory buffer with
/// no import support. Every import attempt fails with `CannotOpenImport`.
pub struct NullHost {
    pub platform: String,
}

impl Default for NullHost {
    fn default() -> Self {
        Self { platform: "generic".into() }
    }
}

impl Host for NullHost {
    fn resolve_path(&self, logical_name: &str) -> Result<String, HostError> {
        Err(HostError(format!("no filesystem available to resolve '{logical_name}'")))
    }

    fn open_file(&self, path: &str) -> Result<OpenedFile, HostError> {
        Err(HostError(format!("no filesystem available to open '{path}'")))
    }

    fn analyse_path(&self, _path: &str) -> Result<(), HostError> {
        Err(HostError("no filesystem available".into()))
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn log_level(&self) -> u8 {
        0
    }

    fn class_id_to_name(&self, class_id: u32) -> String {
        format!("object#{class_id}")
    }
}

/// A `Host` backed by an in-memory map of logical name to source text, used
/// by the test suite to exercise `import`/`namespace`/circular-import
/// handling without touching the real filesystem.
#[derive(Default)]
pub struct MapHost {
    pub files: std::collections::HashMap<String, String>,
    pub platform: String,
    pub debug: bool,
}

impl Host for MapHost {
    fn resolve_path(&self, logical_name: &str) -> Result<String, HostError> {
        if self.files.contains_key(logical_name) {
            Ok(logical_name.to_string())
        } else {
            Err(HostError(format!("cannot resolve '{logical_name}'")))
        }
    }

    fn open_file(&self, path: &str) -> Result<OpenedFile, HostError> {
        self.files
            .get(path)
            .map(|contents| OpenedFile { size: contents.len(), contents: contents.clone() })
            .ok_or_else(|| HostError(format!("cannot open '{path}'")))
    }

    fn analyse_path(&self, path: &str) -> Result<(), HostError> {
        if self.files.contains_key(path) {
            Ok(())
        } else {
            Err(HostError(format!("'{path}' does not exist")))
        }
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn log_level(&self) -> u8 {
        if self.debug {
            1
        } else {
            0
        }
    }

    fn class_id_to_name(&self, class_id: u32) -> String {
        format!("object#{class_id}")
    }
}
