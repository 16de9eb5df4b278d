pub mod condition;
pub mod event;
pub mod observation;
pub mod script;
pub mod snapshot;
pub mod state;
pub mod trigger;
pub mod validation;

pub use condition::Condition;
pub use event::WatcherEvent;
pub use observation::{
    Observation, EVT_EVENT, EVT_IMPACT, EVT_OPERATION_DONE, EVT_OPERATION_ERROR,
    EVT_OPERATION_RECOVERED, EVT_OPERATION_RECOVERY_FAILED, EVT_OPERATION_SKIPPED,
    EVT_OPERATION_START, EVT_OPERATION_TERMINAL, EVT_PACING_WAIT, EVT_RECOVERY_ACTION, EVT_START,
    EVT_STOP, EVT_WATCH_ERROR,
};
pub use script::{
    CheckpointSpec, ImpactScope, Operation, OnFailure, PacingPolicy, RecoverySpec, RetryPolicy,
    Script, ScriptDefaults, Subscription, ValidationSpec,
};
pub use snapshot::{SnapshotEnvelope, SnapshotState, SNAPSHOT_KIND, SNAPSHOT_VERSION};
pub use state::{
    OperationState, OperationStatus, RunnerFlags, RuntimeContext, ScheduleState, SubscriptionState,
};
pub use trigger::{SubscriptionEventKind, Trigger};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};
