//! Hub daemon
//!
//! Wires the bus, the procedure executor, the event rule engine and the cron
//! scheduler together from a [`hub_config::HubConfig`], and runs the dispatch
//! loop that routes every polled message.

pub mod actions;
pub mod app;
pub mod dispatch;

pub use app::Hub;
pub use dispatch::Dispatcher;
