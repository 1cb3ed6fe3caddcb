//! Subjects being evaluated for trending status (hashtags and shared links)
//! and their persistence boundary.

pub mod dao;
pub mod models;
pub mod repository;
