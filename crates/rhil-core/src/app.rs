//! Application descriptor
//!
//! An [`AppDescriptor`] describes one buildable/flashable unit: where its
//! binaries are, what has to be flashed where, how storage is partitioned
//! and which chip it was built for. It is built once from the build
//! directory and never changes afterwards.
//!
//! A project that hasn't been built yet (no binary directory) is still a
//! valid descriptor, just the [`AppDescriptor::Absent`] variant with nothing
//! parsed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::flash::{read_flash_args, FlashPlan};
use crate::partition::{PartitionTable, PartitionTool};
use crate::sdkconfig::SdkConfig;
use crate::target::Target;

/// Build directory used when none is configured
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Where to look for an application's build output
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Application root; defaults to the current directory
    pub app_path: Option<PathBuf>,
    /// Build directory, absolute or relative to `app_path`; defaults to `build`
    pub build_dir: Option<PathBuf>,
    /// Partition tool; defaults to the SDK's tool under `$IDF_PATH`
    pub part_tool: Option<PathBuf>,
}

impl AppConfig {
    /// Configuration for the application at `app_path`
    pub fn new(app_path: impl Into<PathBuf>) -> Self {
        Self {
            app_path: Some(app_path.into()),
            ..Self::default()
        }
    }

    /// Override the build directory
    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = Some(build_dir.into());
        self
    }

    /// Override the partition tool
    pub fn with_part_tool(mut self, part_tool: impl Into<PathBuf>) -> Self {
        self.part_tool = Some(part_tool.into());
        self
    }

    fn resolve_app_path(&self) -> Result<PathBuf> {
        match &self.app_path {
            Some(p) => Ok(p.clone()),
            None => std::env::current_dir().map_err(|source| CoreError::Io {
                path: PathBuf::from("."),
                source,
            }),
        }
    }
}

/// Immutable description of a built (or not yet built) application
#[derive(Debug, Clone)]
pub enum AppDescriptor {
    /// No binary directory exists; nothing was parsed
    Absent {
        /// Application root
        app_path: PathBuf,
    },
    /// Build output was found and parsed
    Built(Box<BuiltApp>),
}

/// Parsed build output of an application
#[derive(Debug, Clone)]
pub struct BuiltApp {
    app_path: PathBuf,
    binary_path: PathBuf,
    elf_file: Option<PathBuf>,
    bin_file: Option<PathBuf>,
    part_tool: Option<PartitionTool>,
    flash: Option<FlashPlan>,
    partition_table: Option<PartitionTable>,
    sdkconfig: Option<SdkConfig>,
    target: Target,
}

impl AppDescriptor {
    /// Load the descriptor for the configured application
    ///
    /// Missing pieces (manifest, partition tool, config snapshot) are left
    /// empty. Errors are only returned for artifacts that exist but can't be
    /// read or parsed, and when the partition tool rejects every candidate.
    pub fn load(config: &AppConfig) -> Result<Self> {
        let app_path = config.resolve_app_path()?;
        let Some(binary_path) = find_binary_dir(&app_path, config.build_dir.as_deref()) else {
            log::debug!(
                "Binary path not found under {}, skipping parsing app...",
                app_path.display()
            );
            return Ok(Self::Absent { app_path });
        };

        log::debug!("Parsing app build output in {}", binary_path.display());

        let elf_file = find_by_extension(&binary_path, "elf")?;
        let bin_file = find_by_extension(&binary_path, "bin")?;
        let part_tool = PartitionTool::locate(config.part_tool.as_deref());
        let flash = read_flash_args(&binary_path)?;

        let partition_table = match (&part_tool, &flash) {
            (Some(tool), Some(plan)) if !plan.is_empty() => {
                tool.resolve(plan, &binary_path)?.map(|resolved| {
                    for failure in &resolved.failures {
                        log::debug!(
                            "Partition tool rejected {}: {}",
                            failure.file.display(),
                            failure.message.trim_end()
                        );
                    }
                    resolved.table
                })
            }
            _ => None,
        };

        let sdkconfig = SdkConfig::load(&binary_path)?;
        let target = sdkconfig
            .as_ref()
            .and_then(SdkConfig::target)
            .unwrap_or_default();

        Ok(Self::Built(Box::new(BuiltApp {
            app_path,
            binary_path,
            elf_file,
            bin_file,
            part_tool,
            flash,
            partition_table,
            sdkconfig,
            target,
        })))
    }

    /// Application root
    pub fn app_path(&self) -> &Path {
        match self {
            Self::Absent { app_path } => app_path,
            Self::Built(app) => &app.app_path,
        }
    }

    /// Parsed build output, if the application has been built
    pub fn built(&self) -> Option<&BuiltApp> {
        match self {
            Self::Absent { .. } => None,
            Self::Built(app) => Some(app),
        }
    }

    /// Target chip, if the application has been built
    pub fn target(&self) -> Option<&Target> {
        self.built().map(BuiltApp::target)
    }
}

impl BuiltApp {
    /// Application root
    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    /// Directory holding the build output
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// First `.elf` file in the binary directory
    pub fn elf_file(&self) -> Option<&Path> {
        self.elf_file.as_deref()
    }

    /// First `.bin` file in the binary directory
    pub fn bin_file(&self) -> Option<&Path> {
        self.bin_file.as_deref()
    }

    /// Partition tool used to decode the partition table
    pub fn part_tool(&self) -> Option<&PartitionTool> {
        self.part_tool.as_ref()
    }

    /// Flash plan from the build manifest
    pub fn flash(&self) -> Option<&FlashPlan> {
        self.flash.as_ref()
    }

    /// Decoded partition table
    pub fn partition_table(&self) -> Option<&PartitionTable> {
        self.partition_table.as_ref()
    }

    /// Build configuration snapshot
    pub fn sdkconfig(&self) -> Option<&SdkConfig> {
        self.sdkconfig.as_ref()
    }

    /// Target chip (`esp32` unless the snapshot says otherwise)
    pub fn target(&self) -> &Target {
        &self.target
    }
}

fn find_binary_dir(app_path: &Path, build_dir: Option<&Path>) -> Option<PathBuf> {
    let build_dir = build_dir.unwrap_or(Path::new(DEFAULT_BUILD_DIR));
    let candidate = if build_dir.is_absolute() {
        build_dir.to_path_buf()
    } else {
        app_path.join(build_dir)
    };

    if candidate.is_dir() {
        Some(candidate.canonicalize().unwrap_or(candidate))
    } else {
        None
    }
}

/// Find the first file (by name) with the given extension
fn find_by_extension(dir: &Path, ext: &str) -> Result<Option<PathBuf>> {
    let read_dir = fs::read_dir(dir).map_err(|source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut matches: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
        .collect();
    matches.sort();

    Ok(matches
        .into_iter()
        .next()
        .map(|p| p.canonicalize().unwrap_or(p)))
}
