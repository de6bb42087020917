pub mod settings;
pub mod token;
