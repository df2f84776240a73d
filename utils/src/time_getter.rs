use std::sync::Arc;

use crate::time::{self, Time};

pub trait TimeGetterFn: Send + Sync {
    fn get_time(&self) -> Time;
}

/// The clock used to stamp requests. Cloning shares the underlying source.
#[derive(Clone)]
pub struct TimeGetter {
    f: Arc<dyn TimeGetterFn>,
}

impl TimeGetter {
    #[must_use]
    pub fn new(f: Arc<dyn TimeGetterFn>) -> Self {
        Self { f }
    }

    /// A getter that always returns `time`; used where a deterministic clock is needed
    #[must_use]
    pub fn fixed(time: Time) -> Self {
        Self::new(Arc::new(FixedTimeGetterFn(time)))
    }

    #[must_use]
    pub fn get_time(&self) -> Time {
        self.f.get_time()
    }
}

impl Default for TimeGetter {
    fn default() -> Self {
        Self::new(Arc::new(SystemTimeGetterFn))
    }
}

impl std::fmt::Debug for TimeGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeGetter").finish_non_exhaustive()
    }
}

struct SystemTimeGetterFn;

impl TimeGetterFn for SystemTimeGetterFn {
    fn get_time(&self) -> Time {
        time::get_time()
    }
}

struct FixedTimeGetterFn(Time);

impl TimeGetterFn for FixedTimeGetterFn {
    fn get_time(&self) -> Time {
        self.0
    }
}
