pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod session;

// Re-export main types for convenience
pub use client::{QaClient, QaEndpoint};
pub use config::{ClientSettings, Config};
pub use error::{AskError, ConfigError};
pub use message::{Message, Role};
pub use session::{ChatSession, Phase, PendingQuery, SessionView, Settlement, FALLBACK_REPLY};
