pub mod access;
pub mod activity;
pub mod auth;
pub mod config;
pub mod db;
pub mod elo;
pub mod error;
pub mod games;
pub mod groups;
pub mod http;
pub mod matchdays;
pub mod models;
pub mod players;
pub mod shootouts;
pub mod stats;
pub mod stats_export;
pub mod team_gen;
pub mod teams;
pub mod validate;
