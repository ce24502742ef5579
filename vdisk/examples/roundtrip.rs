//! Copies a host file through a virtual disk image and back out again.
//!
//! cargo run --example roundtrip -- <source> <image> <destination>

use std::env;
use std::path::Path;

use vdisk::io::{read_host_file, write_host_file};
use vdisk::{Geometry, VirtualDisk};

pub fn main() -> vdisk::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: {} <source> <image> <destination>", args[0]);
        std::process::exit(2);
    }
    let (source, image, destination) = (&args[1], &args[2], &args[3]);
    let name = Path::new(source)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");

    let mut disk = VirtualDisk::create(Geometry::default())?;
    disk.save_file(name, &read_host_file(source)?)?;
    disk.save(image)?;
    println!("saved {} to {}", name, image);

    let disk = VirtualDisk::load(image, Geometry::default())?;
    write_host_file(destination, &disk.read_file(name)?)?;
    println!("restored {} to {}", name, destination);
    Ok(())
}
