use std::time::{self, SystemTime};

/// seconds since [UNIX_EPOCH](time::UNIX_EPOCH), in the width the inode record stores
pub fn now() -> i32 {
    SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map_or(0, |now| now.as_secs() as i32)
}
