pub mod payload;

pub use payload::{ChatPayload, GroupId, NotificationPayload};
