pub mod admin_dto;
