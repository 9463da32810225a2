pub mod benchmark;
pub mod config;
pub mod level;
pub mod profiles;
pub mod runner;
pub mod sim;
pub mod trainer;
pub mod util;
