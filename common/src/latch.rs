use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// Clones share one slot. A consumed latch stays closed until rearmed.
#[derive(Debug, Clone)]
pub struct NotificationLatch {
    armed: Arc<AtomicBool>,
}

impl Default for NotificationLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationLatch {
    pub fn new() -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn try_consume(&self) -> bool {
        self.armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn rearm(&self) -> bool {
        !self.armed.swap(true, Ordering::AcqRel)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_once_until_rearmed() {
        let latch = NotificationLatch::new();

        assert!(latch.try_consume());
        assert!(!latch.try_consume());
        assert!(!latch.is_armed());

        assert!(latch.rearm());
        assert!(latch.try_consume());
    }

    #[test]
    fn clones_share_the_slot() {
        let latch = NotificationLatch::new();
        let capture_side = latch.clone();

        assert!(latch.try_consume());
        assert!(!capture_side.is_armed());

        capture_side.rearm();
        assert!(latch.is_armed());
    }

    #[test]
    fn rearming_an_armed_latch_reports_no_change() {
        let latch = NotificationLatch::new();
        assert!(!latch.rearm());
        assert!(latch.is_armed());
    }

    #[test]
    fn concurrent_consumers_get_a_single_winner() {
        let latch = NotificationLatch::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = latch.clone();
                std::thread::spawn(move || latch.try_consume())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
