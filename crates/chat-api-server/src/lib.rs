pub mod config;
pub mod handlers;
pub mod models;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test;
