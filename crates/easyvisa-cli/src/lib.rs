pub mod explore;
pub mod input;
pub mod train;
pub mod util;
