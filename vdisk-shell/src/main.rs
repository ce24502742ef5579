//! Interactive front end for a virtual disk image. Every command loads the
//! image, applies one change and writes it back.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, Select};
use log::debug;
use vdisk::io::{read_host_file, write_host_file};
use vdisk::{Geometry, VirtualDisk};

const ACTIONS: [&str; 6] = [
    "Initialize image",
    "Copy a file into the image",
    "Copy a file out of the image",
    "List files",
    "Show disk info",
    "Quit",
];

fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "Virtual disk shell".bright_cyan().bold());
    let image: String = Input::new()
        .with_prompt("Virtual disk image")
        .default("disk.vd".to_string())
        .interact_text()?;
    let image = PathBuf::from(image);
    let geometry = Geometry::default();

    loop {
        let choice = Select::new()
            .with_prompt("Command")
            .items(&ACTIONS[..])
            .default(0)
            .interact()?;
        debug!("selected {:?}", ACTIONS[choice]);

        let outcome = match choice {
            0 => initialize(&image, geometry),
            1 => copy_in(&image, geometry),
            2 => copy_out(&image, geometry),
            3 => list(&image, geometry),
            4 => info(&image, geometry),
            _ => break,
        };
        // Failed commands never save, so the image on disk is left as it was.
        if let Err(e) = outcome {
            println!("{} {:#}", "Error:".red().bold(), e);
        }
    }

    println!("{}", "Bye!".bright_yellow());
    Ok(())
}

fn open(image: &Path, geometry: Geometry) -> Result<VirtualDisk> {
    VirtualDisk::load(image, geometry)
        .with_context(|| format!("could not open {}", image.display()))
}

fn initialize(image: &Path, geometry: Geometry) -> Result<()> {
    if image.exists()
        && !Confirm::new()
            .with_prompt(format!("{} exists. Overwrite it?", image.display()))
            .default(false)
            .interact()?
    {
        return Ok(());
    }

    VirtualDisk::create(geometry)?.save(image)?;
    println!(
        "{} {} ({} bytes)",
        "Initialized".green(),
        image.display(),
        geometry.image_len()
    );
    Ok(())
}

fn copy_in(image: &Path, geometry: Geometry) -> Result<()> {
    let source: String = Input::new().with_prompt("Source path").interact_text()?;
    let default_name = Path::new(&source)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let name: String = Input::new()
        .with_prompt("Name in image")
        .default(default_name)
        .interact_text()?;

    let bytes = read_host_file(&source)?;
    let mut disk = open(image, geometry)?;
    let ino = disk.save_file(&name, &bytes)?;
    disk.save(image)?;
    println!(
        "{} {} ({} bytes, inode {})",
        "Saved".green(),
        name,
        bytes.len(),
        ino
    );
    Ok(())
}

fn copy_out(image: &Path, geometry: Geometry) -> Result<()> {
    let name: String = Input::new().with_prompt("Name in image").interact_text()?;
    let destination: String = Input::new()
        .with_prompt("Destination path")
        .default(name.clone())
        .interact_text()?;

    let disk = open(image, geometry)?;
    let bytes = disk.read_file(&name)?;
    write_host_file(&destination, &bytes)?;
    println!("{} {} to {}", "Wrote".green(), name, destination);
    Ok(())
}

fn list(image: &Path, geometry: Geometry) -> Result<()> {
    let disk = open(image, geometry)?;
    let entries = disk.list()?;
    if entries.is_empty() {
        println!("{}", "(empty)".bright_black());
    }
    for entry in entries {
        let node = disk.stat(&entry.name)?;
        println!("{:>5}  {:>8}  {}", entry.ino, node.size, entry.name.cyan());
    }
    Ok(())
}

fn info(image: &Path, geometry: Geometry) -> Result<()> {
    let disk = open(image, geometry)?;
    let sb = disk.super_block();
    let created = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(sb.created)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| sb.created.to_string());

    println!("{:<12} {}", "Created".blue(), created);
    println!("{:<12} {} bytes", "Disk size".blue(), sb.disk_size);
    println!("{:<12} {} bytes", "Block size".blue(), sb.block_size);
    println!("{:<12} {}", "Free blocks".blue(), sb.free_blocks);
    println!("{:<12} {}", "Files".blue(), sb.file_count);
    Ok(())
}
