pub mod keyboard;

pub use keyboard::{ActionExecutor, ExecutorError, KeyEvent, VirtualKeyboard};
