pub mod scorecard;
pub mod comment;
pub mod template;
pub mod user;
pub mod config;

pub use scorecard::*;
pub use comment::*;
pub use template::*;
pub use user::*;
pub use config::*;
