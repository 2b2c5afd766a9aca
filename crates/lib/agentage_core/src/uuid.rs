// Record identifiers.
//
// Users and device-code records get app-side UUIDv7 ids so rows sort by
// creation time in both the Postgres and in-memory stores.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new record id in its canonical hyphenated text form.
pub fn new_record_id() -> String {
    uuidv7().hyphenated().to_string()
}
