#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::ZipWriter;

/// Writes a package; names ending in `/` become directory members.
pub fn write_pk3(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut writer = ZipWriter::new(File::create(&path).unwrap());
    let options = FileOptions::default();
    for (entry_name, data) in entries {
        if entry_name.ends_with('/') {
            writer.add_directory(*entry_name, options).unwrap();
        } else {
            writer.start_file(*entry_name, options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap();
    path
}

/// IBSP v46 header with every lump empty.
pub fn minimal_bsp() -> Vec<u8> {
    let mut data = vec![0u8; 8 + 17 * 8];
    data[0..4].copy_from_slice(b"IBSP");
    data[4..8].copy_from_slice(&46u32.to_le_bytes());
    data
}

/// Empty map with a worldspawn entity naming the map.
pub fn named_bsp(message: &str) -> Vec<u8> {
    let entities = format!("{{\n\"classname\" \"worldspawn\"\n\"message\" \"{}\"\n}}\n\0", message);
    let mut data = minimal_bsp();
    let offset = data.len() as u32;
    data[8..12].copy_from_slice(&offset.to_le_bytes());
    data[12..16].copy_from_slice(&(entities.len() as u32).to_le_bytes());
    data.extend_from_slice(entities.as_bytes());
    data
}

/// Uncompressed 24-bit TGA, bottom-up rows as stored by most tools.
pub fn bottom_up_tga(width: u16, height: u16, bgr: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 18];
    data[2] = 2;
    data[12..14].copy_from_slice(&width.to_le_bytes());
    data[14..16].copy_from_slice(&height.to_le_bytes());
    data[16] = 24;
    data.extend_from_slice(bgr);
    data
}
