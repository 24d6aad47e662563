//! Daily fortune draws: one score per user per calendar day, with a single
//! reroll offered when the score is very low.

mod store;

use anyhow::bail;
use chrono::{FixedOffset, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use store::FortuneStore;

pub const REROLL_THRESHOLD: u8 = 10;
pub const REROLL_PREFIX: &str = "REROLL";
pub const REROLL_USED_SUFFIX: &str = "\n（已使用今日重抽）";

const ADVICE_GOOD: &[&str] = &[
    "宜：凹高分, 推ap! 下一个舞神就是你~",
    "宜：放松心态, 冲刺学业&事业.",
    "宜：放手一搏, 突破极限.",
];
const ADVICE_NEUTRAL: &[&str] = &[
    "宜：多运动, 多放松",
    "忌：虚无缥缈为自己定大志向.",
    "吃顿好的吧, 平安即是喜乐.",
];
const ADVICE_BAD: &[&str] = &[
    "人犟损才, 牛犟损力.",
    "放过自己，早点睡，明天会更好.",
    "如果可以的话, 做点没有意义的事情休息一下吧.",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FortuneRecord {
    pub score: u8,
    pub text: String,
    pub rerolled: bool,
    pub created_at: String,
}

impl FortuneRecord {
    pub fn reroll_eligible(&self) -> bool {
        self.score < REROLL_THRESHOLD && !self.rerolled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FortuneTier {
    GreatBlessing,
    Blessing,
    Even,
    Misfortune,
    GreatMisfortune,
}

impl FortuneTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::GreatBlessing,
            70..=89 => Self::Blessing,
            40..=69 => Self::Even,
            10..=39 => Self::Misfortune,
            _ => Self::GreatMisfortune,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::GreatBlessing => "🎉 大吉",
            Self::Blessing => "😊 吉",
            Self::Even => "😐 平",
            Self::Misfortune => "🥲 凶",
            Self::GreatMisfortune => "💀 大凶",
        }
    }

    fn advice_pools(self) -> &'static [&'static [&'static str]] {
        match self {
            Self::GreatBlessing => &[ADVICE_GOOD],
            Self::Blessing => &[ADVICE_GOOD, ADVICE_NEUTRAL],
            Self::Even => &[ADVICE_NEUTRAL],
            Self::Misfortune => &[ADVICE_NEUTRAL, ADVICE_BAD],
            Self::GreatMisfortune => &[ADVICE_BAD],
        }
    }
}

pub fn draw_score<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(0..=100)
}

pub fn build_fortune<R: Rng + ?Sized>(score: u8, rng: &mut R) -> String {
    let tier = FortuneTier::from_score(score);
    let advice: Vec<&str> = tier.advice_pools().iter().flat_map(|pool| pool.iter().copied()).collect();
    let line = advice.choose(rng).copied().unwrap_or_default();
    format!("{}\n今天的幸运指数：{score}/100\n{line}", tier.label())
}

/// Callback payload of the reroll button: `REROLL:<user>:<date>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerollToken {
    pub user: i64,
    pub date: String,
}

impl RerollToken {
    pub fn encode(&self) -> String {
        format!("{REROLL_PREFIX}:{}:{}", self.user, self.date)
    }

    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let prefix = parts.next()?;
        let user = parts.next()?.trim().parse::<i64>().ok()?;
        let date = parts.next()?.trim();
        if prefix != REROLL_PREFIX || date.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(Self {
            user,
            date: date.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FortuneDraw {
    pub date: String,
    pub record: FortuneRecord,
    /// Present when the record still qualifies for its one reroll.
    pub reroll: Option<RerollToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerollOutcome {
    Rerolled(FortuneRecord),
    NotOwner,
    NoRecord,
    NotEligible,
}

pub struct FortuneBook<R: Rng> {
    store: FortuneStore,
    rng: R,
    offset: FixedOffset,
}

impl<R: Rng> FortuneBook<R> {
    pub fn new(store: FortuneStore, rng: R, utc_offset_hours: i32) -> anyhow::Result<Self> {
        let Some(offset) = FixedOffset::east_opt(utc_offset_hours * 3600) else {
            bail!("invalid fortune utc offset: {utc_offset_hours}h");
        };
        Ok(Self { store, rng, offset })
    }

    pub fn store(&self) -> &FortuneStore {
        &self.store
    }

    pub fn today(&self) -> String {
        Utc::now().with_timezone(&self.offset).date_naive().to_string()
    }

    fn now_iso(&self) -> String {
        Utc::now()
            .with_timezone(&self.offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    pub fn draw_today(&mut self, user: i64) -> anyhow::Result<FortuneDraw> {
        let date = self.today();
        self.draw_on(user, &date)
    }

    /// Returns the stored record for `(user, date)` or draws and stores a new
    /// one.
    pub fn draw_on(&mut self, user: i64, date: &str) -> anyhow::Result<FortuneDraw> {
        let record = match self.store.get(user, date)? {
            Some(existing) => existing,
            None => {
                let score = draw_score(&mut self.rng);
                let record = FortuneRecord {
                    score,
                    text: build_fortune(score, &mut self.rng),
                    rerolled: false,
                    created_at: self.now_iso(),
                };
                self.store.put(user, date, &record)?;
                tracing::debug!(user, date, score, "fortune drawn");
                record
            }
        };
        let reroll = record.reroll_eligible().then(|| RerollToken {
            user,
            date: date.to_string(),
        });
        Ok(FortuneDraw {
            date: date.to_string(),
            record,
            reroll,
        })
    }

    pub fn reroll(&mut self, requester: i64, token: &RerollToken) -> anyhow::Result<RerollOutcome> {
        if requester != token.user {
            return Ok(RerollOutcome::NotOwner);
        }
        let Some(existing) = self.store.get(token.user, &token.date)? else {
            return Ok(RerollOutcome::NoRecord);
        };
        if !existing.reroll_eligible() {
            return Ok(RerollOutcome::NotEligible);
        }
        let score = draw_score(&mut self.rng);
        let record = FortuneRecord {
            score,
            text: build_fortune(score, &mut self.rng),
            rerolled: true,
            created_at: existing.created_at,
        };
        self.store.put(token.user, &token.date, &record)?;
        tracing::debug!(user = token.user, date = %token.date, score, "fortune rerolled");
        Ok(RerollOutcome::Rerolled(record))
    }
}
