pub mod notification;
pub mod progress;
pub mod user;

pub use notification::{
    greeting_for_hour, DispatchReport, EmailTemplate, NotificationContext, NotificationFamily,
    NotificationKind,
};
pub use progress::{Deadline, ProgressSnapshot};
pub use user::{User, UserRole};
