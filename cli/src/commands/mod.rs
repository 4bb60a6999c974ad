mod auth;
mod helpers;
mod log;
mod status;
mod sync;
mod today;
mod weight;

pub(crate) use auth::{cmd_login, cmd_logout};
pub(crate) use log::{MealArgs, cmd_log_exercise, cmd_log_meal};
pub(crate) use status::cmd_status;
pub(crate) use sync::cmd_sync;
pub(crate) use today::cmd_today;
pub(crate) use weight::cmd_log_weight;
