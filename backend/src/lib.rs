pub mod config;
pub mod job_controller;
pub mod pipeline;
pub mod services;
