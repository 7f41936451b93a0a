// THEORY:
// The `protocol` module is everything between the vision core and the wire.
//
// - `command` decodes inbound bytes into a closed set of commands and encodes replies.
// - `serial` owns the channel and the enabled/disabled session state.
// - `engine` ties the two to the detector, one command per scheduling tick.

pub mod command;
pub mod engine;
pub mod serial;
