//! Scratch directories for tests that write products or stores to disk.

/// Creates a temporary directory for test output.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}
