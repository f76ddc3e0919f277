use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use teloxide::types::AllowedUpdate;

/// One event delivered by Telegram.
///
/// Only `update_id` is interpreted; everything else is kept verbatim so
/// handlers can read whatever payload the platform sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Update {
    pub fn new(update_id: i64, payload: Map<String, Value>) -> Self {
        Self { update_id, payload }
    }

    /// The kind of payload carried by this update, if it is a known one.
    pub fn kind(&self) -> Option<UpdateKind> {
        self.payload
            .keys()
            .find_map(|key| serde_json::from_value(Value::String(key.clone())).ok())
    }

    /// Chat id of the message-like payload, used by `Context::reply`.
    pub fn chat_id(&self) -> Option<i64> {
        let message = self
            .payload
            .get("message")
            .or_else(|| self.payload.get("edited_message"))
            .or_else(|| self.payload.get("channel_post"))
            .or_else(|| {
                self.payload
                    .get("callback_query")
                    .and_then(|q| q.get("message"))
            })?;
        message.get("chat")?.get("id")?.as_i64()
    }
}

/// Update kinds accepted by `allowed_updates` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
}

impl From<UpdateKind> for AllowedUpdate {
    fn from(kind: UpdateKind) -> Self {
        match kind {
            UpdateKind::Message => AllowedUpdate::Message,
            UpdateKind::EditedMessage => AllowedUpdate::EditedMessage,
            UpdateKind::ChannelPost => AllowedUpdate::ChannelPost,
            UpdateKind::EditedChannelPost => AllowedUpdate::EditedChannelPost,
            UpdateKind::InlineQuery => AllowedUpdate::InlineQuery,
            UpdateKind::ChosenInlineResult => AllowedUpdate::ChosenInlineResult,
            UpdateKind::CallbackQuery => AllowedUpdate::CallbackQuery,
            UpdateKind::ShippingQuery => AllowedUpdate::ShippingQuery,
            UpdateKind::PreCheckoutQuery => AllowedUpdate::PreCheckoutQuery,
            UpdateKind::Poll => AllowedUpdate::Poll,
            UpdateKind::PollAnswer => AllowedUpdate::PollAnswer,
            UpdateKind::MyChatMember => AllowedUpdate::MyChatMember,
            UpdateKind::ChatMember => AllowedUpdate::ChatMember,
            UpdateKind::ChatJoinRequest => AllowedUpdate::ChatJoinRequest,
        }
    }
}

/// The bot's own account, fetched once via `getMe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
    pub first_name: String,
    #[serde(default)]
    pub can_join_groups: bool,
    #[serde(default)]
    pub can_read_all_group_messages: bool,
    #[serde(default)]
    pub supports_inline_queries: bool,
}

impl From<teloxide::types::Me> for BotIdentity {
    fn from(me: teloxide::types::Me) -> Self {
        Self {
            id: me.user.id.0,
            username: me.user.username.clone().unwrap_or_default(),
            first_name: me.user.first_name.clone(),
            can_join_groups: me.can_join_groups,
            can_read_all_group_messages: me.can_read_all_group_messages,
            supports_inline_queries: me.supports_inline_queries,
        }
    }
}
