pub mod command;
pub mod cycle;
pub mod errors;
pub mod interval;
pub mod retention;
pub mod scheduler;
pub mod settings;
pub mod snapshot;

pub use cycle::{CycleReport, CycleRunner, NoUpdateCheck, TriggerOutcome, UpdateCheck};
pub use interval::interval;
pub use scheduler::{Scheduler, SchedulerState};
pub use settings::Settings;
pub use snapshot::{Snapshot, SnapshotDirectory};
