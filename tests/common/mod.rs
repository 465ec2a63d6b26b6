//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const STUB_LIBRARY: &str = "7f0000001000_7f0000002000_r_x_libfoo_so";
pub const STUB_LIBRARY_BASE: u64 = 0x7f0000001000;

/// `<tmp>/ws/dump/memory`, returned with the tempdir that owns it
pub struct Workspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub memory: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let memory = root.join("dump").join("memory");
        fs::create_dir_all(&memory).unwrap();
        Self {
            _dir: dir,
            root,
            memory,
        }
    }

    pub fn add_mapping(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.memory.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    pub fn trace_list(&self) -> PathBuf {
        self.root.join("trace_list")
    }

    pub fn trace_lines(&self) -> Vec<String> {
        fs::read_to_string(self.trace_list())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Raw code with a PLT-style stub at 0 (`jmp [rip+0xa]`) and a `ret` at 16
pub fn stub_library_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    bytes[..6].copy_from_slice(&[0xff, 0x25, 0x0a, 0x00, 0x00, 0x00]);
    bytes[16] = 0xc3;
    bytes
}

/// ELF64 executable, one R+X PT_LOAD at 0x400000, code at 0x400078:
/// `call 0x40007d; ret`
pub fn tiny_elf() -> Vec<u8> {
    let code = [0xe8, 0x00, 0x00, 0x00, 0x00, 0xc3];
    let total = 0x78 + code.len() as u64;

    let mut elf = vec![0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    elf.extend_from_slice(&2u16.to_le_bytes());
    elf.extend_from_slice(&0x3eu16.to_le_bytes());
    elf.extend_from_slice(&1u32.to_le_bytes());
    elf.extend_from_slice(&0x400078u64.to_le_bytes());
    elf.extend_from_slice(&64u64.to_le_bytes());
    elf.extend_from_slice(&0u64.to_le_bytes());
    elf.extend_from_slice(&0u32.to_le_bytes());
    elf.extend_from_slice(&64u16.to_le_bytes());
    elf.extend_from_slice(&56u16.to_le_bytes());
    elf.extend_from_slice(&1u16.to_le_bytes());
    elf.extend_from_slice(&64u16.to_le_bytes());
    elf.extend_from_slice(&0u16.to_le_bytes());
    elf.extend_from_slice(&0u16.to_le_bytes());

    elf.extend_from_slice(&1u32.to_le_bytes());
    elf.extend_from_slice(&5u32.to_le_bytes());
    elf.extend_from_slice(&0u64.to_le_bytes());
    elf.extend_from_slice(&0x400000u64.to_le_bytes());
    elf.extend_from_slice(&0x400000u64.to_le_bytes());
    elf.extend_from_slice(&total.to_le_bytes());
    elf.extend_from_slice(&total.to_le_bytes());
    elf.extend_from_slice(&0x1000u64.to_le_bytes());

    elf.extend_from_slice(&code);
    elf
}

/// `elf` with a section table pointing past the end of the buffer, as in a
/// dump of the loaded image
pub fn without_section_table(mut elf: Vec<u8>) -> Vec<u8> {
    elf[0x28..0x30].copy_from_slice(&0x20000u64.to_le_bytes());
    elf[0x3c..0x3e].copy_from_slice(&30u16.to_le_bytes());
    elf
}
