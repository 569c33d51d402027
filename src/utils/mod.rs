pub mod logging;
pub mod tags;

pub use tags::extract_tags;
