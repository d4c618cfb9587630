// FPL gameweek planner service library.

pub mod config;
pub mod error;
pub mod response;
pub mod routes;
pub mod upstream;
