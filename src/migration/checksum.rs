//! Migration checksums.

use sha2::{Digest, Sha256};

/// Hex SHA-256 over a migration's up and down statements.
///
/// Statements are separated so that moving text between two statements still changes
/// the checksum.
pub fn statements_checksum(up: &[&str], down: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (direction, statements) in [("up", up), ("down", down)] {
        hasher.update(direction.as_bytes());
        for statement in statements {
            hasher.update([0u8]);
            hasher.update(statement.trim().as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
