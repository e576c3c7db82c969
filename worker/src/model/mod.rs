pub mod batch;
pub mod channel;
