pub mod admin_dto;
pub mod auth_dto;
pub mod public_dto;
