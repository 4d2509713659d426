mod connect;
mod disconnect;
mod join;
mod message;
mod player_list;
mod update;

pub use connect::Connect;
pub use disconnect::PlayerDisconnect;
pub use join::PlayerJoin;
pub use message::ChatMessage;
pub use player_list::{PlayerListEntry, PlayerListHeader, PlayerListRequest};
pub use update::PlayerUpdate;
