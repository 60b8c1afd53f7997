pub mod ids;
pub mod response;

pub use ids::{FullSubmissionId, compare_short_ids, short_id_from_target};
pub use response::ApiResponse;
