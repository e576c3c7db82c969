pub use super::batch::Entity as Batch;
pub use super::channel::Entity as Channel;
