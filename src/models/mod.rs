pub mod audit_log;
pub mod invitation;
pub mod result_record;
pub mod user;
pub mod webhook_log;
