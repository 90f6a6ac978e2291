pub mod adapters;
pub mod config;
pub mod error;
pub mod security;
pub mod web;
