mod api;
mod pages;

pub use api::{media_file, submissions_json};
pub use pages::{edit_form, edit_handler, index, submission_list, submit_form, submit_handler};
