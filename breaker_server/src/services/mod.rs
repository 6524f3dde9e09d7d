//! Build-break services — resolving, notifying, and the datagram loop.

pub mod listener;
pub mod notifier;
pub mod resolver;
pub mod tally;
