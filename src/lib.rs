pub mod chat;
pub mod collaborators;
pub mod common;
pub mod config;
pub mod error;
pub mod storage;
