// src/exam/mod.rs

pub mod clock;
pub mod providers;
pub mod registry;
pub mod scoring;
pub mod service;
pub mod session;
