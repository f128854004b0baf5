//! Target chip identification

use std::fmt;

/// Target reported when the config snapshot doesn't name one
pub const DEFAULT_TARGET: &str = "esp32";

/// Targets built around an Xtensa core
const XTENSA_TARGETS: &[&str] = &["esp32", "esp32s2", "esp32s3"];

/// CPU architecture family of a target chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// Cadence Xtensa LX6/LX7
    Xtensa,
    /// 32-bit RISC-V
    Riscv32,
}

impl Arch {
    /// Architecture name as used in emulator program names
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Xtensa => "xtensa",
            Self::Riscv32 => "riscv32",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target chip identifier (`esp32`, `esp32c3`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(String);

impl Target {
    /// Create a target from its identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identifier as it appears in build configuration and machine names
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Architecture family of this chip
    pub fn arch(&self) -> Arch {
        if self.is_xtensa() {
            Arch::Xtensa
        } else {
            Arch::Riscv32
        }
    }

    /// Check if this chip has an Xtensa core
    pub fn is_xtensa(&self) -> bool {
        XTENSA_TARGETS.contains(&self.0.as_str())
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
