//! Lua scripts for atomic store operations.
//!
//! Identifier generation is check-then-write; the window between the
//! existence check and the write would otherwise allow two concurrent
//! requests to claim the same key. Atomic Lua execution closes that gap.

/// Lua script for atomic hash create-if-absent.
///
/// Arguments:
/// - KEYS[1]: Hash key to create
/// - ARGV: Alternating field/value pairs
///
/// Returns:
/// - 1: Created (key was absent, fields written)
/// - 0: Key already exists (nothing written)
pub const HASH_CREATE_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
for i = 1, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;

/// Lua script for atomic hash set-if-exists.
///
/// The dual of [`HASH_CREATE_IF_ABSENT`]: an update must never revive a
/// key that was deleted between the caller's read and its write, which a
/// plain HSET would do.
///
/// Arguments:
/// - KEYS[1]: Hash key to update
/// - ARGV: Alternating field/value pairs
///
/// Returns:
/// - 1: Updated (key was present, fields written)
/// - 0: Key does not exist (nothing written)
pub const HASH_SET_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
for i = 1, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;
