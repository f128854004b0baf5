//! Default efuse (OTP memory) images
//!
//! QEMU emulates the efuse block with a raw file attached as a drive. A
//! fresh file must hold a valid blank image for the chip; these are mostly
//! zeros with a few chip-revision bits set.

use std::fs;
use std::path::Path;

use rhil_core::Target;

use crate::error::{QemuError, Result};

/// Strap mode selecting normal boot with the efuse drive attached
pub const STRAP_MODE_BOOT: &str = "0x08";

/// Strap mode selecting download (provisioning) mode
pub const STRAP_MODE_DOWNLOAD: &str = "0x0f";

/// Sparse description of a blank efuse image
struct EfuseImage {
    target: &'static str,
    len: usize,
    /// `(byte index, value)` pairs that aren't zero
    set: &'static [(usize, u8)],
}

const EFUSE_IMAGES: &[EfuseImage] = &[
    EfuseImage {
        target: "esp32",
        len: 124,
        set: &[(13, 0x80), (22, 0x10)],
    },
    EfuseImage {
        target: "esp32c3",
        len: 1024,
        set: &[(38, 0x0c)],
    },
];

/// Check if a blank efuse image is known for the target
pub fn is_supported(target: &Target) -> bool {
    EFUSE_IMAGES.iter().any(|img| img.target == target.name())
}

/// Blank efuse image for the target
pub fn default_efuse(target: &Target) -> Result<Vec<u8>> {
    let image = EFUSE_IMAGES
        .iter()
        .find(|img| img.target == target.name())
        .ok_or_else(|| QemuError::UnsupportedEfuseTarget(target.name().to_string()))?;

    let mut data = vec![0u8; image.len];
    for &(idx, value) in image.set {
        data[idx] = value;
    }
    Ok(data)
}

/// Overwrite `path` with the blank efuse image for the target
pub fn write_default_efuse(path: &Path, target: &Target) -> Result<()> {
    let data = default_efuse(target)?;
    log::debug!("The eFuse file will be saved to: {}", path.display());
    fs::write(path, data).map_err(|source| QemuError::EfuseWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// QEMU arguments attaching `path` as the efuse drive of `target`
pub fn efuse_args(target: &Target, path: &Path, strap_mode: &str) -> Vec<String> {
    vec![
        "-global".to_string(),
        format!("driver={}.gpio,property=strap_mode,value={}", target, strap_mode),
        "-drive".to_string(),
        format!("file={},if=none,format=raw,id=efuse", path.display()),
        "-global".to_string(),
        format!("driver=nvram.{}.efuse,property=drive,value=efuse", target),
    ]
}
