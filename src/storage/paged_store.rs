use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use lru::LruCache;
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::{Result, WindowError};
use crate::storage::sequence_store::{Position, SequenceStore};
use crate::storage::spill_file::{SpillFile, SpillSlot};

/// Index of a page in the store's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(usize);

#[derive(Debug)]
struct Page {
    first_pos: Position,
    len: usize,
    bytes: usize,
    /// `None` while the page lives only in the spill file.
    records: Option<Vec<Bytes>>,
    spill_slot: Option<SpillSlot>,
    prev: Option<PageId>,
    next: Option<PageId>,
}

impl Page {
    fn new(first_pos: Position, prev: Option<PageId>) -> Self {
        Self {
            first_pos,
            len: 0,
            bytes: 0,
            records: Some(Vec::new()),
            spill_slot: None,
            prev,
            next: None,
        }
    }

    fn end_pos(&self) -> Position {
        self.first_pos + self.len as Position
    }
}

/// Counters for tests and debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagedStoreStats {
    pub pages: usize,
    pub resident_pages: usize,
    pub resident_bytes: usize,
    pub spills: u64,
    pub reloads: u64,
}

/// Sequence store made of fixed-budget pages.
///
/// Pages sit in an arena and link to neighbours by id. The tail page takes
/// appends and always stays in memory; sealed pages are tracked in an LRU and
/// written to a spill file with bincode once the resident bytes exceed the
/// memory limit. A spilled page is read back on access.
#[derive(Debug)]
pub struct PagedSequenceStore {
    config: StoreConfig,
    pages: Vec<Option<Page>>,
    free_ids: Vec<usize>,
    head: Option<PageId>,
    tail: Option<PageId>,
    by_first_pos: BTreeMap<Position, PageId>,
    resident: LruCache<PageId, ()>,
    resident_bytes: usize,
    spill: Option<SpillFile>,
    first: Position,
    end: Position,
    spills: u64,
    reloads: u64,
}

impl PagedSequenceStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pages: Vec::new(),
            free_ids: Vec::new(),
            head: None,
            tail: None,
            by_first_pos: BTreeMap::new(),
            resident: LruCache::unbounded(),
            resident_bytes: 0,
            spill: None,
            first: 0,
            end: 0,
            spills: 0,
            reloads: 0,
        }
    }

    pub fn stats(&self) -> PagedStoreStats {
        PagedStoreStats {
            pages: self.by_first_pos.len(),
            resident_pages: self.resident.len() + usize::from(self.tail.is_some()),
            resident_bytes: self.resident_bytes,
            spills: self.spills,
            reloads: self.reloads,
        }
    }

    /// Logical size of the spill file in bytes, zero before the first spill.
    pub fn spill_len(&self) -> u64 {
        self.spill.as_ref().map_or(0, |s| s.len())
    }

    pub fn spill_path(&self) -> Option<PathBuf> {
        self.spill.as_ref().map(|s| s.path().to_path_buf())
    }

    fn page(&self, id: PageId) -> Result<&Page> {
        self.pages
            .get(id.0)
            .and_then(|p| p.as_ref())
            .ok_or_else(|| WindowError::internal(format!("dangling page id {:?}", id)))
    }

    fn page_mut(&mut self, id: PageId) -> Result<&mut Page> {
        self.pages
            .get_mut(id.0)
            .and_then(|p| p.as_mut())
            .ok_or_else(|| WindowError::internal(format!("dangling page id {:?}", id)))
    }

    fn alloc_page(&mut self, page: Page) -> PageId {
        match self.free_ids.pop() {
            Some(idx) => {
                self.pages[idx] = Some(page);
                PageId(idx)
            }
            None => {
                self.pages.push(Some(page));
                PageId(self.pages.len() - 1)
            }
        }
    }

    fn free_page(&mut self, id: PageId) -> Option<Page> {
        let page = self.pages.get_mut(id.0).and_then(|p| p.take());
        if page.is_some() {
            self.free_ids.push(id.0);
        }
        page
    }

    /// Seals the current tail and opens a fresh one starting at `end`.
    fn open_tail(&mut self) -> Result<PageId> {
        let prev = self.tail;
        let id = self.alloc_page(Page::new(self.end, prev));
        if let Some(prev_id) = prev {
            self.page_mut(prev_id)?.next = Some(id);
            self.resident.put(prev_id, ());
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        self.by_first_pos.insert(self.end, id);
        Ok(id)
    }

    fn evict_until_within_limit(&mut self, keep: Option<PageId>) -> Result<()> {
        while self.resident_bytes > self.config.memory_limit_bytes {
            let Some((victim, ())) = self.resident.pop_lru() else {
                break;
            };
            if Some(victim) == keep {
                // Only the page being read remains; put it back and stop.
                self.resident.put(victim, ());
                break;
            }
            self.spill_page(victim)?;
        }
        Ok(())
    }

    fn spill_page(&mut self, id: PageId) -> Result<()> {
        let dir = self
            .config
            .spill_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        if self.spill.is_none() {
            let file = SpillFile::create(&dir)?;
            debug!(path = %file.path().display(), "opened window buffer spill file");
            self.spill = Some(file);
        }

        let page = self.page_mut(id)?;
        let Some(records) = page.records.take() else {
            return Ok(());
        };
        let bytes = page.bytes;
        let first_pos = page.first_pos;
        let slot = match page.spill_slot {
            Some(slot) => slot,
            None => {
                let raw: Vec<Vec<u8>> = records.iter().map(|r| r.to_vec()).collect();
                let encoded = bincode::serialize(&raw)
                    .map_err(|e| WindowError::codec(format!("spilling page: {e}")))?;
                let spill = self
                    .spill
                    .as_mut()
                    .ok_or_else(|| WindowError::internal("spill file missing"))?;
                let slot = spill.write(&encoded)?;
                self.page_mut(id)?.spill_slot = Some(slot);
                slot
            }
        };
        self.resident_bytes = self.resident_bytes.saturating_sub(bytes);
        self.spills += 1;
        debug!(
            first_pos,
            page_bytes = bytes,
            spill_offset = slot.offset,
            "spilled window buffer page"
        );
        Ok(())
    }

    fn ensure_resident(&mut self, id: PageId) -> Result<()> {
        let page = self.page(id)?;
        if page.records.is_some() {
            if Some(id) != self.tail {
                let _ = self.resident.get(&id);
            }
            return Ok(());
        }
        let slot = page
            .spill_slot
            .ok_or_else(|| WindowError::internal("non-resident page without spill slot"))?;
        let first_pos = page.first_pos;
        let spill = self
            .spill
            .as_mut()
            .ok_or_else(|| WindowError::internal("spill file missing"))?;
        let encoded = spill.read(slot)?;
        let raw: Vec<Vec<u8>> = bincode::deserialize(&encoded)
            .map_err(|e| WindowError::codec(format!("reloading page: {e}")))?;
        let records: Vec<Bytes> = raw.into_iter().map(Bytes::from).collect();

        let page = self.page_mut(id)?;
        let bytes = page.bytes;
        page.records = Some(records);
        self.resident_bytes += bytes;
        self.resident.put(id, ());
        self.reloads += 1;
        trace!(first_pos, page_bytes = bytes, "reloaded window buffer page");
        self.evict_until_within_limit(Some(id))
    }

    fn locate(&self, pos: Position) -> Option<PageId> {
        self.by_first_pos
            .range(..=pos)
            .next_back()
            .map(|(_, id)| *id)
    }
}

impl SequenceStore for PagedSequenceStore {
    fn append(&mut self, record: Bytes) -> Result<Position> {
        let need_new = match self.tail {
            None => true,
            Some(id) => {
                let tail = self.page(id)?;
                tail.len > 0 && tail.bytes + record.len() > self.config.page_size_bytes
            }
        };
        let tail_id = if need_new {
            self.open_tail()?
        } else {
            self.tail
                .ok_or_else(|| WindowError::internal("missing tail page"))?
        };

        let pos = self.end;
        let size = record.len();
        let tail = self.page_mut(tail_id)?;
        tail.records
            .as_mut()
            .ok_or_else(|| WindowError::internal("tail page is not resident"))?
            .push(record);
        tail.len += 1;
        tail.bytes += size;
        self.resident_bytes += size;
        self.end += 1;

        self.evict_until_within_limit(None)?;
        Ok(pos)
    }

    fn get(&mut self, pos: Position) -> Result<Option<Bytes>> {
        if pos < self.first || pos >= self.end {
            return Ok(None);
        }
        let id = self
            .locate(pos)
            .ok_or_else(|| WindowError::internal(format!("no page holds position {pos}")))?;
        self.ensure_resident(id)?;
        let page = self.page(id)?;
        if pos >= page.end_pos() {
            return Err(WindowError::internal(format!("no page holds position {pos}")));
        }
        let idx = (pos - page.first_pos) as usize;
        Ok(page.records.as_ref().and_then(|r| r.get(idx)).cloned())
    }

    fn trim(&mut self, before: Position) -> Result<()> {
        let before = before.min(self.end);
        if before <= self.first {
            return Ok(());
        }
        self.first = before;

        while let Some(id) = self.head {
            let (end_pos, next, resident, bytes, first_pos) = {
                let page = self.page(id)?;
                (page.end_pos(), page.next, page.records.is_some(), page.bytes, page.first_pos)
            };
            if end_pos > before {
                break;
            }
            self.by_first_pos.remove(&first_pos);
            let _ = self.resident.pop(&id);
            if resident {
                self.resident_bytes = self.resident_bytes.saturating_sub(bytes);
            }
            if Some(id) == self.tail {
                self.tail = None;
            }
            if let Some(slot) = self.free_page(id).and_then(|page| page.spill_slot) {
                if let Some(spill) = self.spill.as_mut() {
                    spill.release(slot);
                }
            }
            self.head = next;
            if let Some(next_id) = next {
                self.page_mut(next_id)?.prev = None;
            }
            trace!(first_pos, end_pos, "trimmed window buffer page");
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.pages.clear();
        self.free_ids.clear();
        self.head = None;
        self.tail = None;
        self.by_first_pos.clear();
        self.resident.clear();
        self.resident_bytes = 0;
        self.first = 0;
        self.end = 0;
        if let Some(spill) = self.spill.as_mut() {
            spill.truncate()?;
        }
        Ok(())
    }

    fn first_position(&self) -> Position {
        self.first
    }

    fn end_position(&self) -> Position {
        self.end
    }
}
