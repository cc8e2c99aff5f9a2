pub mod difficulty;
pub mod quality;
