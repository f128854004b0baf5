//! CLI command implementations

pub mod app;
pub mod qemu;

use rhil_core::AppConfig;

use crate::cli::AppArgs;

impl From<&AppArgs> for AppConfig {
    fn from(args: &AppArgs) -> Self {
        AppConfig {
            app_path: args.app_path.clone(),
            build_dir: args.build_dir.clone(),
            part_tool: args.part_tool.clone(),
        }
    }
}
