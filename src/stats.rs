//! Per-store operation counters, reported at `index.close()` (§4.5).

use std::fmt;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
pub struct Counter {
    pub count: u64,
    pub time: Duration,
}

impl Counter {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.time += elapsed;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub add: Counter,
    pub find: Counter,
    pub get: Counter,
    pub load: Counter,
    pub trim: Counter,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} add={}/{:?} find={}/{:?} get={}/{:?} load={}/{:?} trim={}/{:?}",
            self.hits,
            self.misses,
            self.evictions,
            self.add.count,
            self.add.time,
            self.find.count,
            self.find.time,
            self.get.count,
            self.get.time,
            self.load.count,
            self.load.time,
            self.trim.count,
            self.trim.time,
        )
    }
}
