//! HTTP request handlers.

pub mod clock;
pub mod content;
pub mod export;
pub mod sync;

pub use clock::clock_status;
pub use content::{get_content, get_content_in_dir};
pub use export::export;
pub use sync::{processing_status, trigger_sync};
