pub mod category;
pub mod log_entry;
pub mod tag;

pub use category::{Category, CategoryInput, CategoryUpdate, DEFAULT_CATEGORY_ID};
pub use log_entry::{LogEntry, NewLogEntry, TagRef};
pub use tag::{Tag, TagUpdate};
