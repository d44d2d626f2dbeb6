// Test modules for resilience-engine crate
//
// Test organization follows the template pattern where each source file
// has a corresponding test file that focuses on business logic verification.

// Test helper utilities shared by the unit tests
pub mod helpers;

pub mod retry;
