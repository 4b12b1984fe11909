use std::time::Duration;

use crate::settings::Settings;

pub const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Period between cycles: one day split evenly across `runs_per_day`.
pub fn interval(settings: &Settings) -> Duration {
    Duration::from_millis(MILLIS_PER_DAY) / settings.runs_per_day.get()
}
