pub mod board;
pub mod game;
pub mod message;
pub mod movement;
pub mod notification;
