pub mod ai_cache;
pub mod enums;
pub mod notification;
pub mod report;
pub mod template;

pub use ai_cache::*;
pub use notification::*;
pub use report::*;
pub use template::*;
