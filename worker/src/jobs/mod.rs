pub mod intake;
pub mod poller;
pub mod reconcile;
