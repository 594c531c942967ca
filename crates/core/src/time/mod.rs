pub mod window;

pub use window::{parse_windows, Window};
