//! Static page table for the two routes of the application.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Relative path
    pub path: &'static str,
    /// Navigation label
    pub name: &'static str,
}

pub const HOME: Page = Page {
    path: "/",
    name: "ホーム",
};

pub const CHAT_ROOM: Page = Page {
    path: "/chatRoom",
    name: "チャットルーム",
};

/// Pages in navigation order.
pub const ALL: [Page; 2] = [HOME, CHAT_ROOM];

impl Page {
    pub fn from_path(path: &str) -> Option<Page> {
        ALL.iter().copied().find(|page| page.path == path)
    }

    /// Only the chat room consumes the message stream.
    pub fn is_chat_room(&self) -> bool {
        *self == CHAT_ROOM
    }
}
