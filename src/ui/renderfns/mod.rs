pub mod footer;
pub mod form;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use utils::{platform_color, row_marker, truncate};
