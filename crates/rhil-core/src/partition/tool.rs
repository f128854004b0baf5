//! Partition table extraction via the external partition tool

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{parse_partition_csv, PartitionTable};
use crate::error::{CandidateFailure, CoreError, Result};
use crate::flash::FlashPlan;

/// Environment variable pointing at the SDK checkout
pub const IDF_PATH_ENV: &str = "IDF_PATH";

/// Partition tool location relative to `$IDF_PATH`
const DEFAULT_TOOL_SUBPATH: [&str; 3] = ["components", "partition_table", "gen_esp32part.py"];

/// Interpreter used for `.py` partition tools
const PYTHON: &str = "python3";

/// Marker the tool's stderr carries when it rejects its input
const FAILURE_MARKER: &str = "Traceback";

/// Handle to the partition tool executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTool {
    path: PathBuf,
    interpreter: Option<PathBuf>,
}

/// Result of a successful partition table lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPartitions {
    /// Decoded table
    pub table: PartitionTable,
    /// Candidate file the table was decoded from
    pub source: PathBuf,
    /// Candidates rejected by the tool before `source` was accepted
    pub failures: Vec<CandidateFailure>,
}

impl PartitionTool {
    /// Locate the partition tool
    ///
    /// Uses `explicit` if given, otherwise the default location under
    /// `$IDF_PATH`. Returns `None` (and logs a warning) if the file doesn't
    /// exist.
    pub fn locate(explicit: Option<&Path>) -> Option<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => default_tool_path(),
        };

        if path.is_file() {
            let path = path.canonicalize().unwrap_or(path);
            log::debug!("Using partition tool {}", path.display());
            Some(Self::from_path(path))
        } else {
            log::warn!(
                "Partition tool not found at {} (default: $IDF_PATH/components/partition_table/gen_esp32part.py)",
                path.display()
            );
            None
        }
    }

    /// Use `path` as the tool without checking that it exists
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let interpreter = path
            .extension()
            .is_some_and(|e| e == "py")
            .then(|| PathBuf::from(PYTHON));
        Self { path, interpreter }
    }

    /// Run the tool through `interpreter` instead of executing it directly
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Path to the tool
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self) -> Command {
        match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.path);
                cmd
            }
            None => Command::new(&self.path),
        }
    }

    /// Run the tool against one partition binary
    ///
    /// Returns the tool's stdout, or the failure text if the tool couldn't
    /// be started or printed a traceback.
    fn decode(&self, partition_file: &Path) -> std::result::Result<String, String> {
        let output = self
            .command()
            .arg(partition_file)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to run partition tool: {}", e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains(FAILURE_MARKER) {
            return Err(stderr.into_owned());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Recover the partition table from the flash plan
    ///
    /// Every flash file named like a partition table is tried in offset
    /// order; the first one the tool accepts wins, even if its output
    /// decodes to an empty table. Returns `Ok(None)` when the plan has no
    /// candidate at all, and an error listing every rejection when all
    /// candidates fail.
    pub fn resolve(&self, plan: &FlashPlan, binary_dir: &Path) -> Result<Option<ResolvedPartitions>> {
        let mut failures = Vec::new();

        for candidate in plan.partition_candidates() {
            let file = binary_dir.join(&candidate.path);
            match self.decode(&file) {
                Ok(stdout) => {
                    let table = parse_partition_csv(&stdout);
                    log::debug!(
                        "Decoded {} partitions from {}",
                        table.len(),
                        file.display()
                    );
                    return Ok(Some(ResolvedPartitions {
                        table,
                        source: file,
                        failures,
                    }));
                }
                Err(message) => {
                    log::debug!("Partition tool rejected {}", file.display());
                    failures.push(CandidateFailure { file, message });
                }
            }
        }

        if failures.is_empty() {
            log::debug!("No partition table candidate in flash plan");
            return Ok(None);
        }

        Err(CoreError::NoPartitionTable {
            binary_dir: binary_dir.to_path_buf(),
            tool: self.path.clone(),
            failures,
        })
    }
}

fn default_tool_path() -> PathBuf {
    let mut path = PathBuf::from(env::var_os(IDF_PATH_ENV).unwrap_or_default());
    path.extend(DEFAULT_TOOL_SUBPATH);
    path
}
