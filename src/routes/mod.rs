pub mod submissions;

pub use submissions::configure_submissions_routes;
