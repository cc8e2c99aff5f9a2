pub mod node;
pub mod pledge;
