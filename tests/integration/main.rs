//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! end to end. All tests run on the host (x86_64) over loopback TCP and
//! in-memory links; no real hardware required.

mod dispatcher_tests;
mod lifecycle_tests;
mod mock_link;
mod serial_tests;
mod socket_tests;
