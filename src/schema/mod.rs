/// Plain data records shared by the engine: nodes, choices, the player,
/// parsed commands and detected paradoxes.

pub mod command;
pub mod node;
pub mod paradox;
pub mod player;
