//! Salted rehashing of identity columns.
//!
//! Two runs writing the same logical rows into one table must not share synthetic identities, yet
//! a replay with the same salt has to reproduce them exactly. The new identity is a name-based (v5)
//! UUID in the nil namespace whose name is `SHA-256(identity ++ salt)`.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::database::postgres::sql_type_wrapper::PgValue;

pub fn rehash_identity(identity: &[u8; 16], salt: &str) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(identity);
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();

    Uuid::new_v5(&Uuid::nil(), &digest).into_bytes()
}

/// Rehashes the identity values of one row in place. Only UUID values at `positions` are touched.
pub fn rehash_row_identities(row: &mut [PgValue], positions: &[usize], salt: &str) {
    for &position in positions {
        if let Some(PgValue::Uuid(value)) = row.get_mut(position) {
            *value = Uuid::from_bytes(rehash_identity(value.as_bytes(), salt));
        }
    }
}
