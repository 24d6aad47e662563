use anyhow::Result;
use panelbot_contracts::fortune::{
    FortuneBook, FortuneDraw, RerollOutcome, RerollToken, REROLL_PREFIX, REROLL_USED_SUFFIX,
};
use rand::Rng;

use crate::telegram::InlineButton;

pub const START_TEXT: &str = "发 /fortune 来抽今日运势（当日保留；若 <10 可重抽一次）。";
const REROLL_BUTTON: &str = "再抽一次（今日仅一次）";
const INVALID_REQUEST: &str = "无效请求。";
const NOT_OWNER_ALERT: &str = "只能本人重抽哦～";
const NO_RECORD: &str = "今天还没有抽过，先发 /fortune ～";
const NOT_ELIGIBLE: &str = "重抽次数已用完，或不满足条件（<10）。";

pub fn is_reroll_callback(data: &str) -> bool {
    data.starts_with(REROLL_PREFIX) && data[REROLL_PREFIX.len()..].starts_with(':')
}

pub fn draw_reply(draw: &FortuneDraw) -> (String, Option<InlineButton>) {
    let button = draw.reroll.as_ref().map(|token| InlineButton {
        text: REROLL_BUTTON.to_string(),
        callback_data: token.encode(),
    });
    (draw.record.text.clone(), button)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackReply {
    /// Popup shown only to the presser; the message stays as is.
    Alert(&'static str),
    /// Replaces the fortune message text.
    Edit(String),
}

pub fn reroll_reply<R: Rng>(
    book: &mut FortuneBook<R>,
    requester: i64,
    data: &str,
) -> Result<CallbackReply> {
    let Some(token) = RerollToken::parse(data) else {
        return Ok(CallbackReply::Edit(INVALID_REQUEST.to_string()));
    };
    let reply = match book.reroll(requester, &token)? {
        RerollOutcome::NotOwner => CallbackReply::Alert(NOT_OWNER_ALERT),
        RerollOutcome::NoRecord => CallbackReply::Edit(NO_RECORD.to_string()),
        RerollOutcome::NotEligible => CallbackReply::Edit(NOT_ELIGIBLE.to_string()),
        RerollOutcome::Rerolled(record) => {
            CallbackReply::Edit(format!("{}{REROLL_USED_SUFFIX}", record.text))
        }
    };
    Ok(reply)
}
