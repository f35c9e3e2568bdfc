pub mod game;
pub mod socket;
