pub mod constants;
pub mod guard;
pub mod interactable;
pub mod level;
pub mod movement;
pub mod ping_manager;
pub mod protocol;
pub mod puzzle;
pub mod room;
pub mod room_manager;
pub mod types;
