pub mod campaign;
pub mod directory;
pub mod dispatch;
pub mod health;
pub mod job;
pub mod mail;
pub mod message;
pub mod options;
pub mod receipt;
pub mod response;
pub mod retry;
pub mod status;
pub mod template;
pub mod validation;
