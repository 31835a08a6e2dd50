pub mod access;
pub mod books;
pub mod catalog;
pub mod commerce;
pub mod common;
pub mod community;
pub mod reading;
pub mod system;
pub mod users;

pub use access::*;
pub use books::*;
pub use catalog::*;
pub use commerce::*;
pub use common::*;
pub use community::*;
pub use reading::*;
pub use system::*;
pub use users::*;
