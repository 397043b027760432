pub mod apply;
pub mod show;

pub mod util;
