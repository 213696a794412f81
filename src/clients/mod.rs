pub mod database;
pub mod directory;
pub mod health;
pub mod mail;
pub mod template;
