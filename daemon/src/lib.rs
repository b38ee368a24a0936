//! Relays application launch/exit events from the play-event log to a
//! webhook endpoint.
//!
//! The pipeline is [`scanner::EventScanner`] → [`event_queue::EventQueue`] →
//! [`dispatcher::Dispatcher`], sequenced by [`driver::Driver`] on a fixed
//! interval.

pub mod config;
pub mod controllers;
pub mod dispatcher;
pub mod driver;
pub mod event;
pub mod event_queue;
pub mod logging;
pub mod paths;
pub mod payload;
pub mod play_log;
pub mod scanner;
pub mod status;
pub mod titles;
pub mod transport;
