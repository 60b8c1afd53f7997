pub mod analysis;
pub mod common;
pub mod course_users;
pub mod courses;
pub mod logs;
pub mod references;
pub mod submissions;
pub mod tasks;
pub mod tokens;
pub mod users;

pub use common::{ApiResponse, FullSubmissionId};
