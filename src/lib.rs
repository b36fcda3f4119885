pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod migration;
pub mod services;
pub mod tenancy;

#[cfg(test)]
pub mod testing;
