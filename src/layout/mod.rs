pub mod render_window;

pub use render_window::*;
