//! App command implementations

use rhil_core::partition::format_size;
use rhil_core::{AppConfig, AppDescriptor, BuiltApp, FlashPlan, PartitionTable};

use crate::cli::AppArgs;

/// Show the parsed build output
pub fn cmd_show(args: &AppArgs) -> Result<(), Box<dyn std::error::Error>> {
    let app = AppDescriptor::load(&AppConfig::from(args))?;

    match &app {
        AppDescriptor::Absent { app_path } => {
            println!("No build output found for {}", app_path.display());
        }
        AppDescriptor::Built(built) => print_app(built),
    }
    Ok(())
}

fn print_app(app: &BuiltApp) {
    println!("Application");
    println!("===========");
    println!("Path:    {}", app.app_path().display());
    println!("Build:   {}", app.binary_path().display());
    println!("Target:  {} ({})", app.target(), app.target().arch());
    println!("ELF:     {}", display_opt(app.elf_file()));
    println!("Binary:  {}", display_opt(app.bin_file()));
    println!(
        "PartTool: {}",
        display_opt(app.part_tool().map(|t| t.path()))
    );

    match app.flash() {
        Some(plan) => print_flash_plan(plan),
        None => println!("\nNo flash manifest"),
    }

    match app.partition_table() {
        Some(table) => print_partition_table(table),
        None => println!("\nNo partition table"),
    }
}

/// Print flash files and settings
pub fn print_flash_plan(plan: &FlashPlan) {
    println!("\nFlash files ({}):", plan.len());
    println!("{:<12} {:>9} Path", "Offset", "Encrypted");
    println!("{:-<60}", "");
    for file in plan.files() {
        println!(
            "{:#010x}   {:>9} {}",
            file.offset,
            if file.encrypted { "yes" } else { "-" },
            file.path.display()
        );
    }

    let settings = plan.settings();
    if !settings.options().is_empty() {
        println!("\nFlash settings:");
        for (name, value) in settings.options() {
            println!("  {:<16} {}", name, value);
        }
    }
}

/// Print partition table entries
pub fn print_partition_table(table: &PartitionTable) {
    println!("\nPartitions ({}):", table.len());
    println!(
        "{:<16} {:<6} {:<10} {:>10} {:>10} {:>10} Flags",
        "Name", "Type", "SubType", "Offset", "End", "Size"
    );
    println!("{:-<80}", "");
    for entry in table.entries() {
        println!(
            "{:<16} {:<6} {:<10} {:#010x} {:#010x} {:>10} {}",
            entry.name,
            entry.kind,
            entry.subtype,
            entry.offset,
            entry.end(),
            format_size(entry.size),
            entry.flags
        );
    }
}

fn display_opt(path: Option<&std::path::Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}
