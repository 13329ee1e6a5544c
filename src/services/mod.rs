pub mod attempt_service;
pub mod audit_service;
pub mod auth_service;
pub mod export_service;
pub mod invitation_service;
pub mod mail_service;
pub mod notification_service;
pub mod result_service;
pub mod test_service;
