// Licensed under the Apache-2.0 license

//! Linux errno values reported by the firmware and the verifier.

pub const EFAULT: i64 = 14;
pub const EINVAL: i64 = 22;
pub const ENOSYS: i64 = 38;
pub const EBADMSG: i64 = 74;
pub const EOVERFLOW: i64 = 75;
pub const EKEYREJECTED: i64 = 129;
