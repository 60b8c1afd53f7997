pub mod archive;
pub mod json;
pub mod parameter_error_handler;
pub mod password;
pub mod serde_base64;
pub mod timeout;
pub mod validate;

pub use json::{read_json_file, to_pretty_string, write_json_file};
pub use parameter_error_handler::{json_error_handler, query_error_handler};
pub use validate::{is_email, normalize_email, validate_email, validate_id};
