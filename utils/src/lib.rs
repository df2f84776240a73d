pub mod env;
pub mod time;
pub mod time_getter;
