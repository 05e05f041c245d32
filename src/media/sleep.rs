use std::thread;
use std::time::{Duration, Instant};

/// Blocks the calling thread for roughly the given duration.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Coarse `thread::sleep` for all but the last millisecond, then spins until
/// the deadline. Keeps pacing jitter well under a frame on platforms with a
/// coarse scheduler tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreciseSleep;

const SPIN_WINDOW: Duration = Duration::from_millis(1);

impl Sleeper for PreciseSleep {
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        if duration > SPIN_WINDOW {
            thread::sleep(duration - SPIN_WINDOW);
        }
        let mut spins = 0u32;
        while Instant::now() < deadline {
            if spins < 100 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                thread::yield_now();
            }
        }
    }
}
