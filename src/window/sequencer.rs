use std::cmp::Ordering;
use std::collections::VecDeque;

use arrow::compute::SortOptions;
use datafusion::scalar::ScalarValue;

use crate::common::key::{compare_keys, keys_equal};
use crate::error::{Result, WindowError};

/// Per-row counters stored next to each buffered input row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowInfo {
    /// 0-based position in the partition.
    pub row_index: u64,
    /// 0-based peer group number.
    pub peer_group: u64,
    pub rank: u64,
    pub dense_rank: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencedRow {
    pub info: RowInfo,
    /// Peer group that this row's arrival closed, if any.
    pub closed_group: Option<u64>,
}

/// Detects partition and peer-group breaks and keeps rank bookkeeping.
#[derive(Debug)]
pub struct PeerSequencer {
    sort_options: Vec<SortOptions>,
    partition_key: Option<Vec<ScalarValue>>,
    last_order_key: Option<Vec<ScalarValue>>,
    rows: u64,
    peer_group: u64,
    /// Rows in groups before the current one.
    non_peer_count: u64,
    /// Rows seen so far in the current group.
    peer_count: u64,
    dense_rank: u64,
    closed_groups: u64,
    /// End (exclusive row index) of each closed group still of interest,
    /// starting at group `first_retained_group`.
    group_ends: VecDeque<u64>,
    first_retained_group: u64,
}

impl PeerSequencer {
    pub fn new(sort_options: Vec<SortOptions>) -> Self {
        Self {
            sort_options,
            partition_key: None,
            last_order_key: None,
            rows: 0,
            peer_group: 0,
            non_peer_count: 0,
            peer_count: 0,
            dense_rank: 0,
            closed_groups: 0,
            group_ends: VecDeque::new(),
            first_retained_group: 0,
        }
    }

    /// True when `key` differs from the partition being sequenced. The first
    /// row of the input never starts a "new" partition here.
    pub fn is_new_partition(&self, key: &[ScalarValue]) -> bool {
        match &self.partition_key {
            Some(current) => !keys_equal(current, key),
            None => false,
        }
    }

    pub fn reset(&mut self) {
        let sort_options = std::mem::take(&mut self.sort_options);
        *self = Self::new(sort_options);
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn next_row(&mut self, partition_key: Vec<ScalarValue>, order_key: Vec<ScalarValue>) -> Result<SequencedRow> {
        if self.partition_key.is_none() {
            self.partition_key = Some(partition_key);
        }
        let row_index = self.rows;
        let mut closed_group = None;

        let ordering = self
            .last_order_key
            .as_ref()
            .map(|prev| compare_keys(prev, &order_key, &self.sort_options));
        match ordering {
            None => {
                self.peer_count = 1;
                self.dense_rank = 1;
            }
            Some(Ordering::Equal) => self.peer_count += 1,
            Some(Ordering::Less) => {
                closed_group = Some(self.close_group()?);
                self.non_peer_count += self.peer_count;
                self.peer_count = 1;
                self.peer_group += 1;
                self.dense_rank += 1;
            }
            Some(Ordering::Greater) => {
                return Err(WindowError::InvalidArgument(format!(
                    "input row {row_index} is out of order for the window ordering"
                )));
            }
        }

        self.last_order_key = Some(order_key);
        self.rows += 1;
        Ok(SequencedRow {
            info: RowInfo {
                row_index,
                peer_group: self.peer_group,
                rank: self.non_peer_count + 1,
                dense_rank: self.dense_rank,
            },
            closed_group,
        })
    }

    /// Closes the last peer group at partition end.
    pub fn finish_partition(&mut self) -> Result<Option<u64>> {
        if self.rows == 0 {
            return Ok(None);
        }
        self.close_group().map(Some)
    }

    fn close_group(&mut self) -> Result<u64> {
        let group = self.peer_group;
        if self.closed_groups != group {
            return Err(WindowError::internal(format!(
                "peer group {group} closed twice"
            )));
        }
        self.group_ends.push_back(self.rows);
        self.closed_groups += 1;
        Ok(group)
    }

    pub fn is_group_closed(&self, group: u64) -> bool {
        group < self.closed_groups
    }

    /// Exclusive end row of a closed peer group.
    pub fn group_end(&self, group: u64) -> Option<u64> {
        let idx = group.checked_sub(self.first_retained_group)?;
        self.group_ends.get(idx as usize).copied()
    }

    /// Forgets group ends before `group`; rows are emitted in order so they are not asked for again.
    pub fn release_groups_before(&mut self, group: u64) {
        while self.first_retained_group < group && !self.group_ends.is_empty() {
            self.group_ends.pop_front();
            self.first_retained_group += 1;
        }
    }
}
