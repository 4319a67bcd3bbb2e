pub mod entry;
pub mod hook;
pub mod message;
pub mod plan;
pub mod ratelimit;
pub mod session;

pub use entry::TranscriptLine;
pub use hook::SessionEndHook;
pub use message::{Content, ContentItem, MessageObj, MessageUsage};
pub use plan::{MAX_WINDOW_HOURS, PlanConfig, PlanType, UsageWindow, WindowKind};
pub use ratelimit::{LimitEvent, LimitEventType, LimitType, StoredLimitEvent, UsageSummary};
pub use session::{ParsedTranscript, SessionRecord, SessionStatistics};
