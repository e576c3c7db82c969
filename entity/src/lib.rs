pub mod prelude;

pub mod batch;
pub mod channel;

pub use sea_orm;
