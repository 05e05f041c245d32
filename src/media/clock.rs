use std::time::{Duration, Instant};

/// What to do with a decoded frame given its presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceDecision {
    Deliver,
    /// Deliver after sleeping this long.
    Sleep(Duration),
    /// Too late to show.
    Drop,
}

/// Maps source presentation times onto the wall clock for one stream.
///
/// All times are milliseconds on a monotonic clock whose origin is the
/// moment the clock was created. The `*_at` variants take "now" explicitly.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    origin: Instant,
    reference_ms: i64,
    total_ms: i64,
    paused_at_ms: Option<i64>,
    tolerance_ms: i64,
}

impl PlaybackClock {
    pub fn new(tolerance_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            reference_ms: 0,
            total_ms: 0,
            paused_at_ms: None,
            tolerance_ms: tolerance_ms.min(i64::MAX as u64) as i64,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    pub fn total_ms(&self) -> i64 {
        self.total_ms
    }

    pub fn reference_ms(&self) -> i64 {
        self.reference_ms
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_ms.is_some()
    }

    pub fn mark_start(&mut self, total_ms: i64) {
        let now = self.now_ms();
        self.mark_start_at(total_ms, now);
    }

    pub fn mark_start_at(&mut self, total_ms: i64, now_ms: i64) {
        self.reference_ms = now_ms;
        self.total_ms = total_ms.max(0);
    }

    /// Loop restart: the first frame of the next pass is due immediately.
    pub fn restart(&mut self) {
        let now = self.now_ms();
        self.restart_at(now);
    }

    pub fn restart_at(&mut self, now_ms: i64) {
        self.reference_ms = now_ms;
        if self.paused_at_ms.is_some() {
            self.paused_at_ms = Some(now_ms);
        }
    }

    pub fn pace(&mut self, pts_ms: i64) -> PaceDecision {
        let now = self.now_ms();
        self.pace_at(pts_ms, now)
    }

    pub fn pace_at(&mut self, pts_ms: i64, now_ms: i64) -> PaceDecision {
        let drift = now_ms - self.reference_ms;
        let delta = pts_ms - drift;

        if delta > self.total_ms {
            // the timeline jumped forward past anything we can wait for
            self.reference_ms = now_ms - pts_ms;
            return PaceDecision::Deliver;
        }
        if delta > 0 {
            return PaceDecision::Sleep(Duration::from_millis(delta as u64));
        }
        if delta >= -self.tolerance_ms {
            PaceDecision::Deliver
        } else {
            PaceDecision::Drop
        }
    }

    /// Keeps the first pause instant while already paused. The pipeline only
    /// calls this on a running to paused transition, which is what makes
    /// repeated `StreamPipeline::pause` calls harmless.
    pub fn pause(&mut self) {
        let now = self.now_ms();
        self.pause_at(now);
    }

    pub fn pause_at(&mut self, now_ms: i64) {
        if self.paused_at_ms.is_none() {
            self.paused_at_ms = Some(now_ms);
        }
    }

    /// Shifts the reference by the paused interval so it does not count as drift.
    pub fn resume(&mut self) {
        let now = self.now_ms();
        self.resume_at(now);
    }

    pub fn resume_at(&mut self, now_ms: i64) {
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.reference_ms += (now_ms - paused_at).max(0);
        }
    }
}
