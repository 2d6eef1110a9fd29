use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

static SPILL_FILE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Location of one spilled page inside a spill file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillSlot {
    pub offset: u64,
    pub len: u64,
}

/// Scratch file for spilled pages. Removed on drop.
///
/// Released slots go on a free list and are reused first-fit, so the file
/// only grows when no released slot is large enough.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    file: File,
    len: u64,
    free: Vec<SpillSlot>,
}

impl SpillFile {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let seq = SPILL_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("volga-window-{}-{seq}.spill", std::process::id()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            len: 0,
            free: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes held by released slots that have not been reused yet.
    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(|slot| slot.len).sum()
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<SpillSlot> {
        let len = bytes.len() as u64;
        let offset = match self.take_free(len) {
            Some(offset) => offset,
            None => {
                let offset = self.len;
                self.len += len;
                offset
            }
        };
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(SpillSlot { offset, len })
    }

    /// Hands a slot back for reuse. Its bytes must not be read again.
    pub fn release(&mut self, slot: SpillSlot) {
        if slot.len == 0 {
            return;
        }
        if slot.offset + slot.len == self.len {
            self.len = slot.offset;
            self.reclaim_tail();
            return;
        }
        self.free.push(slot);
    }

    fn take_free(&mut self, len: u64) -> Option<u64> {
        if len == 0 {
            return None;
        }
        let idx = self.free.iter().position(|slot| slot.len >= len)?;
        let slot = self.free[idx];
        if slot.len == len {
            self.free.swap_remove(idx);
        } else {
            self.free[idx] = SpillSlot {
                offset: slot.offset + len,
                len: slot.len - len,
            };
        }
        Some(slot.offset)
    }

    /// Drops free slots that now end at the logical end of the file.
    fn reclaim_tail(&mut self) {
        while let Some(idx) = self.free.iter().position(|slot| slot.offset + slot.len == self.len) {
            self.len = self.free.swap_remove(idx).offset;
        }
    }

    pub fn read(&mut self, slot: SpillSlot) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; slot.len as usize];
        self.file.seek(SeekFrom::Start(slot.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.len = 0;
        self.free.clear();
        Ok(())
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
