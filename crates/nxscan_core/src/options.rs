//! Walk options

/// Options for walking a container image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Whether to walk historical superblocks of the checkpoint ring
    pub include_history: bool,
    /// Cap on historical superblocks, on top of the ring capacity
    pub max_checkpoints: Option<u32>,
    /// Whether the decoder verifies Fletcher-64 checksums
    pub verify_checksums: bool,
    /// Whether encrypted volumes contribute zero entries instead of being read
    pub skip_encrypted_volumes: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_history: true,
            max_checkpoints: None,
            verify_checksums: true,
            skip_encrypted_volumes: true,
        }
    }
}

impl WalkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only processes the current superblock
    pub fn current_only(mut self) -> Self {
        self.include_history = false;
        self
    }

    /// Limits the number of historical superblocks visited
    pub fn with_max_checkpoints(mut self, limit: u32) -> Self {
        self.max_checkpoints = Some(limit);
        self
    }

    /// Accepts blocks whose checksum does not match
    pub fn without_checksums(mut self) -> Self {
        self.verify_checksums = false;
        self
    }

    /// Reads encrypted volumes like any other
    pub fn include_encrypted(mut self) -> Self {
        self.skip_encrypted_volumes = false;
        self
    }

    /// Number of historical superblocks to visit for a ring of `ring_length` slots.
    pub fn history_budget(&self, ring_length: u32) -> u32 {
        if !self.include_history {
            return 0;
        }
        let ring = ring_length.saturating_sub(1);
        self.max_checkpoints.map_or(ring, |limit| limit.min(ring))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let options = WalkOptions::default();
        assert!(options.include_history);
        assert!(options.verify_checksums);
        assert!(options.skip_encrypted_volumes);
        assert_eq!(options.max_checkpoints, None);
    }

    #[rstest]
    #[case(WalkOptions::new(), 8, 7)]
    #[case(WalkOptions::new(), 1, 0)]
    #[case(WalkOptions::new(), 0, 0)]
    #[case(WalkOptions::new().with_max_checkpoints(3), 8, 3)]
    #[case(WalkOptions::new().with_max_checkpoints(30), 8, 7)]
    #[case(WalkOptions::new().current_only(), 8, 0)]
    fn test_history_budget(#[case] options: WalkOptions, #[case] ring: u32, #[case] expected: u32) {
        assert_eq!(options.history_budget(ring), expected);
    }
}
