mod common;
mod mariadb;
mod sql_job;

pub use common::*;
pub use mariadb::*;
pub use sql_job::*;
