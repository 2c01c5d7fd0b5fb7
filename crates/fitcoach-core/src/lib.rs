pub mod api;
pub mod config;
pub mod console;
pub mod error;
pub mod model;
pub mod query;
pub mod settings;
pub mod state;

// Re-export main types for convenience
pub use api::{ApiClient, Backend};
pub use config::Config;
pub use console::{Console, Outcome, PendingRequest};
pub use error::{ApiError, ApiResult};
pub use model::{ChatResponse, FitnessContext, McpTool, ModelOption};
pub use query::{QueryClient, QueryKey, QueryState};
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use state::{ChatEntry, ChatRole};
