pub mod config;
pub mod error;
pub mod execute;
pub mod form;
pub mod generate;
pub mod response;
pub mod server;
pub mod views;
