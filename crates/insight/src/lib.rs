pub mod context;
pub mod engine;
pub mod error;
pub mod guard;
pub mod period;
pub mod progress;
pub mod ranking;
pub mod recorder;
pub mod report;
pub mod schema;
pub mod signal;
pub mod store;
pub mod telemetry;
pub mod trend;

pub use context::{ContextAggregator, ContextBundle};
pub use engine::{EngineSettings, InsightEngine};
pub use error::{InsightError, Result};
pub use progress::{ProgressTracker, SessionMessage};
pub use recorder::{ConversationMessage, InteractionRecorder};
pub use report::{ProgressReport, ProgressSummary, ReportGenerator};
pub use schema::{
    Goal, GoalStatus, Interaction, OverallMetrics, ProgressEntry, UserInsight, UserProgress,
};
pub use store::{InsightRepository, MemoryRepository, RedbRepository};
pub use telemetry::init_tracing;
