//! Cleaning schedules from rental booking calendars, with change and weekly
//! summary notifications.

pub mod calendar;
pub mod changeover;
pub mod config;
pub mod db;
pub mod diff;
pub mod export;
pub mod message;
pub mod model;
pub mod notify;
pub mod policy;
pub mod run;
pub mod window;
