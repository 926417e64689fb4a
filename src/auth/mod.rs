pub mod handlers;
pub mod middleware;
pub mod password;
pub mod token;
pub mod user;

pub use middleware::{is_logged_in, protect, restrict_to, CurrentUser, Locals};
pub use user::{Role, User};
