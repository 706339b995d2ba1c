pub mod clipboard;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod drafts;
pub mod driver;
pub mod editing;
pub mod error;
pub mod format;
pub mod health;
pub mod net;
pub mod notice;
pub mod render;
pub mod session;
pub mod stream;
pub mod sync;
pub mod timer;
pub mod tui;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
