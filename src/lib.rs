//! # Cell Logger Library
//!
//! Sample the GPS position together with the GSM serving and neighbour
//! cells, batch the samples into XML log files and upload them to a cell
//! mapping collector.
//!
//! The radio state is fed by modem notifications, the sampler plugin is
//! driven by the scheduler, and the upload coordinator shares the log
//! buffer lock with the sampler so files are never uploaded half written.

pub mod admission;
pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod logbuf;
pub mod position;
pub mod radio;
pub mod sampler;
pub mod scheduler;
pub mod upload;
