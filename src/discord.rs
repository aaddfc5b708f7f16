//! Discord adapter: turns gateway messages into pipeline runs

use crate::messaging::{self, ChatSink, MessagingError};
use crate::pipeline::{ChannelKind, MessageOrigin, Pipeline};
use async_trait::async_trait;
use bytes::Bytes;
use serenity::all::{
    ChannelId, Client, Context, CreateAttachment, CreateMessage, EventHandler, GatewayIntents,
    Http, Message, Ready,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Replies into the channel a message arrived on
pub struct DiscordSink {
    http: Arc<Http>,
    channel: ChannelId,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self { http, channel }
    }
}

#[async_trait]
impl ChatSink for DiscordSink {
    async fn send_text(&self, text: &str) -> messaging::Result<()> {
        self.channel
            .say(&*self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::SendFailed(e.to_string()))
    }

    async fn send_file(&self, text: &str, filename: &str, data: Bytes) -> messaging::Result<()> {
        let message = CreateMessage::new()
            .content(text)
            .add_file(CreateAttachment::bytes(data.to_vec(), filename));

        self.channel
            .send_message(&*self.http, message)
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::AttachmentRejected(e.to_string()))
    }
}

/// Gateway event handler feeding the pipeline
pub struct Handler {
    pipeline: Arc<Pipeline>,
}

impl Handler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Sender and channel description used by the pipeline
pub fn origin_of(msg: &Message) -> MessageOrigin {
    let channel_kind = if msg.guild_id.is_none() {
        ChannelKind::Direct
    } else {
        ChannelKind::Group
    };
    let channel_label = match msg.guild_id {
        Some(guild) => format!("guild {} / channel {}", guild, msg.channel_id),
        None => format!("DM {}", msg.channel_id),
    };

    MessageOrigin {
        requester_id: msg.author.id.get(),
        requester_name: msg.author.name.clone(),
        channel_kind,
        channel_label,
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Connected to Discord");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Covers our own replies as well as other bots
        if msg.author.bot {
            return;
        }

        let sink = DiscordSink::new(ctx.http.clone(), msg.channel_id);
        let outcome = self
            .pipeline
            .handle_message(&msg.content, origin_of(&msg), &sink)
            .await;
        debug!(message_id = %msg.id, ?outcome, "Message handled");
    }
}

/// Build a gateway client that feeds `pipeline`
pub async fn connect(token: &str, pipeline: Arc<Pipeline>) -> Result<Client, serenity::Error> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(token, intents)
        .event_handler(Handler::new(pipeline))
        .await
}
