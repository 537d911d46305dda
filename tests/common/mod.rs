#![allow(dead_code)]

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use canonzip::canon::signature;
use canonzip::{MemoryReader, ZipParser};

/// A hand-assembled archive and where its parts landed.
pub struct Built {
    pub bytes: Vec<u8>,
    /// Central directory records
    pub directory: Range<usize>,
    /// Stored data of each member, in the order given
    pub data: Vec<Range<usize>>,
}

fn put16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Assemble a STORED archive with members in exactly the given order.
pub fn stored_zip(members: &[(&str, &[u8])], comment: &[u8]) -> Built {
    let mut bytes = Vec::new();
    let mut central = Vec::new();
    let mut data = Vec::new();

    for (name, content) in members {
        let offset = bytes.len() as u32;
        let crc = crc32fast::hash(content);
        let size = content.len() as u32;

        bytes.extend_from_slice(b"PK\x03\x04");
        put16(&mut bytes, 10);
        put16(&mut bytes, 0);
        put16(&mut bytes, 0);
        put16(&mut bytes, 0x6000);
        put16(&mut bytes, 0x5021);
        put32(&mut bytes, crc);
        put32(&mut bytes, size);
        put32(&mut bytes, size);
        put16(&mut bytes, name.len() as u16);
        put16(&mut bytes, 0);
        bytes.extend_from_slice(name.as_bytes());
        data.push(bytes.len()..bytes.len() + content.len());
        bytes.extend_from_slice(content);

        central.extend_from_slice(b"PK\x01\x02");
        put16(&mut central, 0x031E);
        put16(&mut central, 10);
        put16(&mut central, 0);
        put16(&mut central, 0);
        put16(&mut central, 0x6000);
        put16(&mut central, 0x5021);
        put32(&mut central, crc);
        put32(&mut central, size);
        put32(&mut central, size);
        put16(&mut central, name.len() as u16);
        put16(&mut central, 0);
        put16(&mut central, 0);
        put16(&mut central, 0);
        put16(&mut central, 0);
        put32(&mut central, 0o100644 << 16);
        put32(&mut central, offset);
        central.extend_from_slice(name.as_bytes());
    }

    let directory = bytes.len()..bytes.len() + central.len();
    let cd_offset = bytes.len() as u32;
    bytes.extend_from_slice(&central);

    bytes.extend_from_slice(b"PK\x05\x06");
    put16(&mut bytes, 0);
    put16(&mut bytes, 0);
    put16(&mut bytes, members.len() as u16);
    put16(&mut bytes, members.len() as u16);
    put32(&mut bytes, central.len() as u32);
    put32(&mut bytes, cd_offset);
    put16(&mut bytes, comment.len() as u16);
    bytes.extend_from_slice(comment);

    Built {
        bytes,
        directory,
        data,
    }
}

/// A STORED archive whose comment carries a valid signature.
pub fn signed_zip(members: &[(&str, &[u8])]) -> Built {
    let unsigned = stored_zip(members, &[]);
    let checksum = signature::checksum(&unsigned.bytes[unsigned.directory.clone()]);
    stored_zip(members, &signature::encode(checksum))
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Names and decompressed contents of every member, in physical order.
pub async fn read_members(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
    let directory = parser.central_directory().await.unwrap();
    let mut members = Vec::new();
    for entry in parser.list_files(&directory).await.unwrap() {
        let mut reader = parser.open_entry(&entry).await.unwrap();
        let mut content = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
        }
        members.push((entry.file_name.clone(), content));
    }
    members
}

pub async fn member_names(path: &Path) -> Vec<String> {
    read_members(std::fs::read(path).unwrap())
        .await
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

/// Everything in `dir` apart from `keep`.
pub fn leftovers(dir: &Path, keep: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !keep.contains(&name.as_str()))
        .collect();
    names.sort();
    names
}
