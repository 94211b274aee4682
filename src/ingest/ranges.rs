use crate::models::BlockRange;

/// Contiguous `step`-sized ranges covering `start..=end`, generated lazily.
pub struct BlockRanges {
    next_start: Option<u64>,
    end: u64,
    step: u64,
}

impl BlockRanges {
    pub fn new(start: u64, end: u64, step: u64) -> Self {
        assert!(step > 0);
        Self {
            next_start: if start <= end { Some(start) } else { None },
            end,
            step,
        }
    }
}

impl Iterator for BlockRanges {
    type Item = BlockRange;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let end = start.saturating_add(self.step - 1).min(self.end);
        self.next_start = start
            .checked_add(self.step)
            .filter(|&next| next <= self.end);
        Some(BlockRange::new(start, end))
    }
}
