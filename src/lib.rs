//! Corpsite - corporate website backend
//!
//! Serves published news to the public site, ingests analytics beacons and
//! runs the social pipeline that scrapes company accounts on social
//! platforms and promotes their posts to news.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod social;
