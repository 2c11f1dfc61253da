pub mod covers;
pub mod files;
pub mod folders;
pub mod settings;
