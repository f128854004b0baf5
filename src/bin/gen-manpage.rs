//! Man page generator for rhil
//!
//! Writes `rhil.1` plus one page per subcommand (`rhil-qemu-run.1`, ...).
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

/// Render `cmd` and every nested subcommand into `dir`
fn write_pages(cmd: clap::Command, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    write_page(cmd, "rhil".to_string(), dir, &mut pages)?;
    Ok(pages)
}

fn write_page(
    cmd: clap::Command,
    name: String,
    dir: &Path,
    pages: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for sub in cmd.get_subcommands() {
        let sub_name = format!("{}-{}", name, sub.get_name());
        write_page(sub.clone(), sub_name, dir, pages)?;
    }

    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).title(&name).render(&mut buffer)?;

    let path = dir.join(format!("{}.1", name));
    fs::write(&path, buffer)?;
    pages.push(path);
    Ok(())
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let pages = write_pages(cli::Cli::command(), &output_dir)?;
    for page in &pages {
        println!("Wrote {}", page.display());
    }
    println!(
        "Preview with `man -l {}`, or install with `cp {}/rhil*.1 /usr/local/share/man/man1/`",
        output_dir.join("rhil.1").display(),
        output_dir.display()
    );

    Ok(())
}
