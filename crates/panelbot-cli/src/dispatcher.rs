use anyhow::{Context, Result};
use panelbot_contracts::chat::{help_text, parse_intent, BotCommand};
use panelbot_contracts::dialogue::{
    CancelOutcome, DialogueKind, PhotoInput, PhotoOutcome, SessionTable, Stage, StartOutcome,
};
use panelbot_contracts::events::{payload, EventWriter};
use panelbot_contracts::fortune::FortuneBook;
use rand::Rng;
use serde_json::json;

use crate::comic::{RenderedComic, Renderer, FINAL_CAPTION};
use crate::fortune::{self, CallbackReply};
use crate::telegram::{CallbackQuery, ChatTransport, IncomingMessage, InlineButton, Update};

/// User-facing lines of one comic dialogue.
struct DialogueScript {
    start: &'static str,
    after_first: &'static str,
    before_render: &'static str,
    need_first: Option<&'static str>,
    need_second: Option<&'static str>,
    cancelled: &'static str,
    failure: &'static str,
}

static LEGACY_SCRIPT: DialogueScript = DialogueScript {
    start: "请提供两位苦命鸳鸯的图片.\n请先提供吕布的图片.\n随时可 /cancel 退出.",
    after_first: "等待董卓中.",
    before_render: "两张图片已收到。\n开始AI渲染（约数秒）…",
    need_first: Some("请提供吕布的[图片]. \n随时可 /cancel 退出。"),
    need_second: Some("还差董卓的[图片]. \n随时可 /cancel 退出。"),
    cancelled: "已取消, 吃大份去吧.",
    failure: "吃大份去吧. 渲染时出错：",
};

static ONE_SHOT_SCRIPT: DialogueScript = DialogueScript {
    start: "350234已就位. 请提供[董卓]和[吕布]的图片. \n请先提供[吕布]的图片.\n\
            请最好截图为该人物的半身像, 否则大模型处理可能有点问题. \n随时可 /cancel 退出.",
    after_first: "已收到[吕布]. 请发送[董卓]图片.",
    before_render: "往日种种, 你说的可是往日...(合成中)",
    need_first: None,
    need_second: None,
    cancelled: "已取消. 吃大份去吧.",
    failure: "吃大份去吧. \n渲染出错：",
};

fn script(kind: DialogueKind) -> &'static DialogueScript {
    match kind {
        DialogueKind::Legacy => &LEGACY_SCRIPT,
        DialogueKind::OneShot => &ONE_SHOT_SCRIPT,
    }
}

fn kind_label(kind: DialogueKind) -> &'static str {
    match kind {
        DialogueKind::Legacy => "legacy",
        DialogueKind::OneShot => "one_shot",
    }
}

/// Routes updates one at a time. Replies are best effort: a failed send is
/// logged and never aborts the dialogue bookkeeping.
pub struct Dispatcher<C: ChatTransport, R: Renderer, G: Rng> {
    chat: C,
    renderer: R,
    sessions: SessionTable,
    fortunes: FortuneBook<G>,
    events: EventWriter,
    bot_username: Option<String>,
}

impl<C: ChatTransport, R: Renderer, G: Rng> Dispatcher<C, R, G> {
    pub fn new(
        chat: C,
        renderer: R,
        fortunes: FortuneBook<G>,
        events: EventWriter,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            chat,
            renderer,
            sessions: SessionTable::new(),
            fortunes,
            events,
            bot_username,
        }
    }

    pub fn chat(&self) -> &C {
        &self.chat
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn handle(&mut self, update: Update) -> Result<()> {
        match update {
            Update::Message(message) => self.handle_message(message),
            Update::Callback(query) => self.handle_callback(query),
        }
    }

    fn reply(&self, chat_id: i64, text: &str, button: Option<&InlineButton>) {
        if let Err(err) = self.chat.send_text(chat_id, text, button) {
            tracing::warn!(chat_id, error = %err, "reply failed");
        }
    }

    fn handle_message(&mut self, message: IncomingMessage) -> Result<()> {
        if let Some(file_id) = message.photo_file_id.as_deref() {
            return self.handle_photo(&message, file_id);
        }
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let intent = parse_intent(text);
        if let Some(command) = intent.command() {
            if intent.is_addressed_to(self.bot_username.as_deref()) {
                self.handle_command(&message, command)?;
            }
            return Ok(());
        }
        if intent.raw.trim_start().starts_with('/') {
            return Ok(());
        }

        // Plain text while a dialogue waits on a photo.
        if let Some((kind, stage)) = self.sessions.awaiting_photo(message.chat_id, message.user_id) {
            let lines = script(kind);
            let hint = match stage {
                Stage::AwaitFirst => lines.need_first,
                _ => lines.need_second,
            };
            if let Some(hint) = hint {
                self.reply(message.chat_id, hint, None);
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, message: &IncomingMessage, command: BotCommand) -> Result<()> {
        let (chat_id, user_id) = (message.chat_id, message.user_id);
        match command {
            BotCommand::Dokaku | BotCommand::Dongzhuo => {
                let kind = if command == BotCommand::Dokaku {
                    DialogueKind::Legacy
                } else {
                    DialogueKind::OneShot
                };
                match self.sessions.start(chat_id, user_id, kind) {
                    StartOutcome::Started => {
                        self.events.record(
                            "dialogue_started",
                            payload([
                                ("chat", json!(chat_id)),
                                ("user", json!(user_id)),
                                ("kind", json!(kind_label(kind))),
                            ]),
                        );
                        self.reply(chat_id, script(kind).start, None);
                    }
                    StartOutcome::Busy { owner } => {
                        tracing::debug!(chat_id, user_id, owner, "dialogue busy; command ignored");
                    }
                }
            }
            BotCommand::Cancel => {
                if let CancelOutcome::Cancelled(kind) = self.sessions.cancel(chat_id, user_id) {
                    self.events.record(
                        "dialogue_cancelled",
                        payload([("chat", json!(chat_id)), ("kind", json!(kind_label(kind)))]),
                    );
                    self.reply(chat_id, script(kind).cancelled, None);
                }
            }
            BotCommand::Fortune => {
                let draw = self
                    .fortunes
                    .draw_today(user_id)
                    .context("fortune draw failed")?;
                self.events.record(
                    "fortune_drawn",
                    payload([
                        ("user", json!(user_id)),
                        ("date", json!(draw.date)),
                        ("score", json!(draw.record.score)),
                    ]),
                );
                let (text, button) = fortune::draw_reply(&draw);
                self.reply(chat_id, &text, button.as_ref());
            }
            BotCommand::Start => self.reply(chat_id, fortune::START_TEXT, None),
            BotCommand::Help => self.reply(chat_id, &help_text(), None),
        }
        Ok(())
    }

    fn handle_photo(&mut self, message: &IncomingMessage, file_id: &str) -> Result<()> {
        let (chat_id, user_id) = (message.chat_id, message.user_id);
        let Some((kind, _)) = self.sessions.awaiting_photo(chat_id, user_id) else {
            return Ok(());
        };
        let file = self
            .chat
            .fetch_file(file_id)
            .with_context(|| format!("failed to fetch photo {file_id}"))?;
        tracing::info!(chat_id, user_id, bytes = file.bytes.len(), "photo received");
        let mut photo = PhotoInput {
            bytes: file.bytes,
            file_path: file.file_path,
            public_url: None,
        };
        if kind == DialogueKind::OneShot {
            photo.public_url = self.renderer.upload_reference(&photo);
        }

        match self.sessions.accept_photo(chat_id, user_id, photo) {
            PhotoOutcome::Ignored => {}
            PhotoOutcome::AwaitingSecond { kind } => {
                self.reply(chat_id, script(kind).after_first, None);
            }
            PhotoOutcome::Ready {
                kind,
                first,
                second,
            } => {
                self.reply(chat_id, script(kind).before_render, None);
                let rendered = self.renderer.render(kind, &first, &second);
                self.sessions.finish(chat_id);
                self.deliver(chat_id, kind, rendered);
            }
        }
        Ok(())
    }

    fn deliver(&self, chat_id: i64, kind: DialogueKind, rendered: Result<RenderedComic>) {
        match rendered {
            Ok(comic) => {
                let bytes = comic.jpeg.len();
                if let Err(err) = self
                    .chat
                    .send_photo(chat_id, comic.jpeg, comic.file_name, FINAL_CAPTION)
                {
                    tracing::warn!(chat_id, error = %err, "sending the comic failed");
                }
                self.events.record(
                    "render_finished",
                    payload([
                        ("chat", json!(chat_id)),
                        ("kind", json!(kind_label(kind))),
                        ("bytes", json!(bytes)),
                    ]),
                );
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(chat_id, kind = kind_label(kind), error = %message, "render failed");
                self.events.record(
                    "render_failed",
                    payload([
                        ("chat", json!(chat_id)),
                        ("kind", json!(kind_label(kind))),
                        ("error", json!(message)),
                    ]),
                );
                self.reply(chat_id, &format!("{}{message}", script(kind).failure), None);
            }
        }
    }

    fn handle_callback(&mut self, query: CallbackQuery) -> Result<()> {
        if !fortune::is_reroll_callback(&query.data) {
            return Ok(());
        }
        let reply = fortune::reroll_reply(&mut self.fortunes, query.user_id, &query.data)
            .context("fortune reroll failed")?;
        match reply {
            CallbackReply::Alert(text) => {
                if let Err(err) = self.chat.answer_callback(&query.id, Some(text)) {
                    tracing::warn!(error = %err, "callback answer failed");
                }
            }
            CallbackReply::Edit(text) => {
                if let Err(err) = self.chat.answer_callback(&query.id, None) {
                    tracing::warn!(error = %err, "callback answer failed");
                }
                let (Some(chat_id), Some(message_id)) = (query.chat_id, query.message_id) else {
                    tracing::warn!(callback = %query.id, "callback without a message to edit");
                    return Ok(());
                };
                if let Err(err) = self.chat.edit_text(chat_id, message_id, &text) {
                    tracing::warn!(chat_id, message_id, error = %err, "edit failed");
                }
                self.events.record(
                    "fortune_callback",
                    payload([("user", json!(query.user_id)), ("data", json!(query.data))]),
                );
            }
        }
        Ok(())
    }
}
