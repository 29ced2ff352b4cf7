#[macro_export]
macro_rules! debug_log {
	($($arg:tt)*) => {{
		#[cfg(debug_assertions)]
		{
			eprintln!($($arg)*);
		}
	}};
}

pub mod classify;
pub mod config;
pub mod frontend;
pub mod graph;
pub mod model;
pub mod persist;
pub mod render;
pub mod slicer;
pub mod tree;
