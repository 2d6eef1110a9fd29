/// What has to be known before the current row's window values can be produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessRequirements {
    /// Some function reads the frame, so its leading edge must be resolved.
    pub lead_edge: bool,
    /// Some function needs the partition row count (`percent_rank`, `cume_dist`, `ntile`).
    pub partition_end: bool,
    /// Some function needs the end of the current peer group (`cume_dist`,
    /// RANGE running aggregates).
    pub peer_group_end: bool,
    /// Largest constant `lead` offset; rows up to `current + lead_rows` must be buffered.
    pub lead_rows: u64,
}

/// Snapshot of engine progress for the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowProgress {
    pub current: u64,
    pub ingested: u64,
    pub partition_complete: bool,
    pub lead_resolved: bool,
    pub peer_group_closed: bool,
    /// The bounds alone prove the frame has no rows.
    pub frame_empty: bool,
    /// Largest `lead` offset needed by this row's per-row expressions.
    pub row_lead: u64,
}

/// Decides whether the engine can emit the current row or must pull more input.
#[derive(Debug, Clone, Copy)]
pub struct OutputReadinessGate {
    requirements: ReadinessRequirements,
}

impl OutputReadinessGate {
    pub fn new(requirements: ReadinessRequirements) -> Self {
        Self { requirements }
    }

    pub fn requirements(&self) -> &ReadinessRequirements {
        &self.requirements
    }

    pub fn is_ready(&self, progress: &RowProgress) -> bool {
        if progress.partition_complete {
            return true;
        }
        let req = &self.requirements;
        if req.partition_end {
            return false;
        }
        if req.peer_group_end && !progress.peer_group_closed {
            return false;
        }
        if req.lead_edge && !progress.frame_empty && !progress.lead_resolved {
            return false;
        }
        let lead = req.lead_rows.max(progress.row_lead);
        // lead targets are read from the buffer; a target past the partition end
        // is only known once the partition completes
        if lead > 0 && progress.current.saturating_add(lead) >= progress.ingested {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(current: u64, ingested: u64) -> RowProgress {
        RowProgress {
            current,
            ingested,
            partition_complete: false,
            lead_resolved: false,
            peer_group_closed: false,
            frame_empty: false,
            row_lead: 0,
        }
    }

    #[test]
    fn test_trivial_requirements_always_ready() {
        let gate = OutputReadinessGate::new(ReadinessRequirements::default());
        assert!(gate.is_ready(&progress(0, 1)));
    }

    #[test]
    fn test_lead_edge_and_empty_frame() {
        let gate = OutputReadinessGate::new(ReadinessRequirements { lead_edge: true, ..Default::default() });
        assert!(!gate.is_ready(&progress(0, 1)));
        assert!(gate.is_ready(&RowProgress { lead_resolved: true, ..progress(0, 1) }));
        assert!(gate.is_ready(&RowProgress { frame_empty: true, ..progress(0, 1) }));
    }

    #[test]
    fn test_partition_end_and_peer_groups() {
        let gate = OutputReadinessGate::new(ReadinessRequirements { partition_end: true, ..Default::default() });
        assert!(!gate.is_ready(&RowProgress { lead_resolved: true, peer_group_closed: true, ..progress(0, 5) }));
        assert!(gate.is_ready(&RowProgress { partition_complete: true, ..progress(0, 5) }));

        let gate = OutputReadinessGate::new(ReadinessRequirements { peer_group_end: true, ..Default::default() });
        assert!(!gate.is_ready(&progress(0, 5)));
        assert!(gate.is_ready(&RowProgress { peer_group_closed: true, ..progress(0, 5) }));
    }

    #[test]
    fn test_lead_lookahead() {
        let gate = OutputReadinessGate::new(ReadinessRequirements { lead_rows: 2, ..Default::default() });
        assert!(!gate.is_ready(&progress(3, 5)));
        assert!(gate.is_ready(&progress(3, 6)));
        let gate = OutputReadinessGate::new(ReadinessRequirements::default());
        assert!(!gate.is_ready(&RowProgress { row_lead: 1, ..progress(3, 4) }));
    }
}
