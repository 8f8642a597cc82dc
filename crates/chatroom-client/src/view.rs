//! Presentation surface.
//!
//! Pure functions of the view model: nothing here owns state beyond the
//! viewer's time zone. Input handlers forward to the view model.
//!
//! The zone is applied per instant, so a message from the other side of a
//! daylight-saving switch renders with the offset in force at that moment.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

use chatroom_shared::constants::ENTER_KEY_CODE;
use chatroom_shared::{AuthState, Message};

use crate::view_model::MessageViewModel;

pub const SIGN_IN_REQUIRED: &str = "この画面はサインインが必要です。";
pub const PROGRESS: &str = "…";
pub const SIGN_IN_LABEL: &str = "サインイン";
pub const UPDATES_STOPPED: &str = "リアルタイム更新が停止しました。";

const TIMESTAMP_FORMAT: &str = "%Y年%m月%d日 %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const ENTER: KeyCode = KeyCode(ENTER_KEY_CODE);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Own,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub id: String,
    pub body: String,
    pub user: String,
    pub time: String,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "surface", rename_all = "camelCase")]
pub enum Surface {
    Progress,
    SignInRequired,
    ChatRoom {
        greeting: String,
        draft: String,
        rows: Vec<MessageRow>,
        /// Live updates have stopped; the rows may be out of date.
        stale: bool,
    },
}

/// Header widget showing who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "badge", rename_all = "camelCase")]
pub enum AccountBadge {
    Loading,
    SignIn,
    User {
        title: String,
        avatar: Option<String>,
    },
}

impl AccountBadge {
    pub fn for_state(state: &AuthState) -> Self {
        match state {
            AuthState::Unknown => AccountBadge::Loading,
            AuthState::SignedOut => AccountBadge::SignIn,
            AuthState::SignedIn(identity) => AccountBadge::User {
                title: identity.display_name.clone(),
                avatar: identity.avatar_url.clone(),
            },
        }
    }
}

impl fmt::Display for AccountBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountBadge::Loading => f.write_str(PROGRESS),
            AccountBadge::SignIn => write!(f, "[{SIGN_IN_LABEL}]"),
            AccountBadge::User { title, .. } => write!(f, "({title})"),
        }
    }
}

pub fn greeting(name: &str) -> String {
    format!("ようこそ{name}さん！")
}

pub fn format_timestamp<Tz>(at: DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    at.with_timezone(zone).format(TIMESTAMP_FORMAT).to_string()
}

pub struct ChatView<Tz = Local> {
    zone: Tz,
}

impl ChatView<Local> {
    /// A view rendering timestamps in the machine's local zone.
    pub fn local() -> Self {
        Self::new(Local)
    }
}

impl<Tz> ChatView<Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    /// A view rendering timestamps in `zone`.
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn render(&self, vm: &MessageViewModel) -> Surface {
        match vm.auth() {
            AuthState::Unknown => Surface::Progress,
            AuthState::SignedOut => Surface::SignInRequired,
            AuthState::SignedIn(identity) => Surface::ChatRoom {
                greeting: greeting(&identity.display_name),
                draft: vm.draft().to_string(),
                rows: vm
                    .snapshot()
                    .iter()
                    .map(|message| self.row(vm, message))
                    .collect(),
                stale: vm.is_stale(),
            },
        }
    }

    fn row(&self, vm: &MessageViewModel, message: &Message) -> MessageRow {
        MessageRow {
            id: message.id.to_string(),
            body: message.body.clone(),
            user: message.user.clone(),
            time: format_timestamp(message.timestamp.instant(), &self.zone),
            side: if vm.is_own(message) {
                Side::Own
            } else {
                Side::Other
            },
        }
    }

    pub fn on_text_change(&self, vm: &mut MessageViewModel, text: &str) {
        vm.on_draft_change(text);
    }

    /// Enter submits a non-empty draft; other keys are ignored.
    pub fn on_key_down(
        &self,
        vm: &mut MessageViewModel,
        key: KeyCode,
    ) -> Option<BoxFuture<'static, ()>> {
        if key != KeyCode::ENTER || vm.draft().is_empty() {
            return None;
        }
        vm.submit()
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Progress => writeln!(f, "{PROGRESS}"),
            Surface::SignInRequired => writeln!(f, "{SIGN_IN_REQUIRED}"),
            Surface::ChatRoom {
                greeting,
                draft,
                rows,
                stale,
            } => {
                writeln!(f, "{greeting}")?;
                if *stale {
                    writeln!(f, "({UPDATES_STOPPED})")?;
                }
                writeln!(f, "> {draft}")?;
                for row in rows {
                    match row.side {
                        Side::Own => writeln!(f, "{:>40}  [{}]", row.body, row.time)?,
                        Side::Other => {
                            writeln!(f, "{}: {}  [{}]", row.user, row.body, row.time)?
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
