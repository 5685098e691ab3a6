pub mod file_service;
pub mod paths;
pub mod session;
pub mod vfs;
