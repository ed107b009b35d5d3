//! Input from Bitcoin: follows a node's best block and turns it into an
//! ordered stream of chain events.

pub mod reader;
