pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod jobs;
pub mod landing;
pub mod limits;
pub mod pricing;
pub mod responses;
pub mod router;
pub mod state;
pub mod templates;
pub mod uploads;

pub use auth::{SESSION_COOKIE, SESSION_TTL_DAYS};
pub use responses::{ApiMessage, JobCompleted, json_error};
pub use state::AppState;
pub use templates::{escape_html, render_footer, render_login_page};
