pub mod challenge;
pub mod pledge;
pub mod proof_of_space;
pub mod proof_pack;
pub mod sized_bytes;
pub mod vdf_proof;
