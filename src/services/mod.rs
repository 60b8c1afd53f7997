pub mod submissions;
pub mod tasks;

pub use submissions::SubmissionService;
