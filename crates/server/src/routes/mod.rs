pub mod auth;
pub mod health;
pub mod pages;
pub mod reports;
pub mod staff;
pub mod stats;
pub mod students;
pub mod sync;
