pub mod config;
pub mod contracts;
pub mod error;
pub mod executor;
pub mod impact;
pub mod normalizer;
pub mod operation_state;
pub mod queue;
pub mod recovery;
pub mod runner;
pub mod schedule_state;
pub mod scheduler;
pub mod subscription_state;
pub mod validator;

pub use config::{resolve_config, ConfigProvenance, PartialRunnerConfig, RunnerConfig};
pub use contracts::{
    Checkpoint, ExecutionContext, Executor, ExecutorOutcome, ExternalOperationExecutor,
    ValidationOutcome, ValidationPhase, Validator as ValidatorContract, WatchHandle, Watcher,
};
pub use error::RunnerError;
pub use executor::{MockExecutorHook, Observe, OperationExecutor, Outcome};
pub use impact::{FailureScope, ImpactEngine};
pub use normalizer::normalize_script;
pub use operation_state::OperationStateStore;
pub use queue::OperationQueue;
pub use recovery::{run_recovery, RecoveryOutcome};
pub use runner::{DoneResult, MockEvent, Runner};
pub use schedule_state::ScheduleStateStore;
pub use scheduler::Scheduler;
pub use subscription_state::SubscriptionStateStore;
pub use validator::validate;
