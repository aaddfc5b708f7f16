pub mod config;
pub mod discord;
pub mod dispatch;
pub mod fetch;
pub mod gate;
pub mod humanize;
pub mod links;
pub mod messaging; // Expose for tests (RecordingSink)
pub mod observability;
pub mod pipeline;
pub mod publish;
pub mod retention;
