//! Adaptive retrain threshold

/// Fires a retrain once both label counts clear a bar that rises with every
/// retrain already fired
#[derive(Debug, Clone)]
pub struct RetrainSchedule {
    base: usize,
    triggers: usize,
}

impl RetrainSchedule {
    pub fn new(base: usize) -> Self {
        Self { base, triggers: 0 }
    }

    /// Label count each class must exceed for the next retrain
    pub fn next_threshold(&self) -> usize {
        (self.triggers + 1) * self.base
    }

    pub fn triggers(&self) -> usize {
        self.triggers
    }

    /// Check the counts after a commit. Returns true when a retrain is due.
    pub fn observe(&mut self, positives: usize, negatives: usize) -> bool {
        let threshold = self.next_threshold();
        if positives > threshold && negatives > threshold {
            self.triggers += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_rises_after_each_trigger() {
        let mut schedule = RetrainSchedule::new(1);
        assert!(!schedule.observe(1, 1));
        assert!(!schedule.observe(5, 1));
        assert!(schedule.observe(2, 2));
        assert_eq!(schedule.triggers(), 1);
        assert!(!schedule.observe(2, 2));
        assert!(!schedule.observe(3, 2));
        assert!(schedule.observe(3, 3));
        assert_eq!(schedule.next_threshold(), 3);
    }

    #[test]
    fn test_larger_base() {
        let mut schedule = RetrainSchedule::new(10);
        assert!(!schedule.observe(10, 11));
        assert!(schedule.observe(11, 11));
        assert!(!schedule.observe(20, 20));
        assert!(schedule.observe(21, 21));
    }
}
