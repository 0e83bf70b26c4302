//! `comptoir-observability`: process-wide tracing setup shared by the binary
//! and the tests.

mod subscriber;

pub use subscriber::{DEFAULT_DIRECTIVES, LogFormat, init, init_for_tests, init_with};
