pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod invitations;
pub mod relay;
pub mod setup;
