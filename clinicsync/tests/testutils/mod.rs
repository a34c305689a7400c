//! Test utilities for ClinicSync integration tests
//!
//! - SyncFixture: cache, executor and mutation coordinator wired together
//! - FakeBackend: scripted API collaborator that counts its calls

pub mod backend;
pub mod sync_fixture;
