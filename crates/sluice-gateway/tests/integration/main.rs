//! End-to-end tests for the v1 API surface.
//!
//! Each suite spins up a real gateway on an ephemeral port with the
//! in-memory provider mounted and drives it over HTTP.

mod common;
mod test_auth_limits;
mod test_files;
mod test_folders;
mod test_transfers;
