mod download;
mod license;
mod order;
mod product;
mod user;

pub use download::*;
pub use license::*;
pub use order::*;
pub use product::*;
pub use user::*;
