pub mod config;
pub mod poll_loop;
