//! Shared process plumbing for tipwatch binaries.

pub mod logging;
