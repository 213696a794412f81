pub mod campaigns;
pub mod delivery;
pub mod enqueuer;
pub mod messages;
pub mod strategy;
