mod fallback;
mod session;

pub use fallback::send_with_fallback;
pub use session::{ChatSession, ChatSettings};
