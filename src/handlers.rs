use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use teloxide::{
    dispatching::UpdateHandler,
    dptree,
    prelude::*,
    requests::{HasPayload, Payload, Request},
    types::{
        CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Message,
        MessageId, ParseMode, ReplyParameters, UserId,
    },
    utils::html::escape,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::autodelete::Autodelete;
use crate::chart;
use crate::config::{Config, TagsConfig};
use crate::stats::{self, ActiveMember, PolicyClass, SubmissionKind, UserReport};
use crate::store::{MediaKind, Store, User};

const DEFAULT_AUTODELETE_SECS: u64 = 300;
const DEFAULT_PENDING_TTL_SECS: u64 = 300;
const SESSION_PRUNE_TICK_SECS: u64 = 60;

/// Review cards longer than this get split into chart + text messages to
/// stay clear of Telegram's caption/message limits.
const SPLIT_THRESHOLD_CHARS: usize = 3500;

const REVIEW_HEADER: &str = "for review:";

pub struct AppState {
    pub group_id: ChatId,
    pub group_name: String,
    pub tags: TagsConfig,
    /// Member -> policy table from the config; anyone missing gets standard.
    pub policies: HashMap<u64, PolicyClass>,
    pub store: Store,
    pub autodelete: Autodelete,
    pub autodelete_secs: u64,
    pub pending_media_ttl_secs: u64,
    /// Media posted without a tag, waiting for a follow-up tag message.
    pub pending_media: DashMap<UserId, PendingMedia>,
    /// Users who pressed "custom range" and owe us a date span.
    pub awaiting_range: DashMap<UserId, DateTime<Utc>>,
}

pub struct PendingMedia {
    pub file_id: String,
    pub media: MediaKind,
    pub message_id: MessageId,
    pub at: DateTime<Utc>,
}

impl AppState {
    pub fn new(cfg: &Config, store: Store) -> Self {
        AppState {
            group_id: ChatId(cfg.group.chat_id),
            group_name: cfg.group.name.clone(),
            tags: cfg.tags.clone(),
            policies: crate::config::policy_table(cfg),
            store,
            autodelete: Autodelete::new(),
            autodelete_secs: cfg.runtime.autodelete_secs.unwrap_or(DEFAULT_AUTODELETE_SECS),
            pending_media_ttl_secs: cfg
                .runtime
                .pending_media_ttl_secs
                .unwrap_or(DEFAULT_PENDING_TTL_SECS),
            pending_media: DashMap::new(),
            awaiting_range: DashMap::new(),
        }
    }

    fn policy_for(&self, tg_id: u64) -> PolicyClass {
        self.policies.get(&tg_id).copied().unwrap_or_default()
    }
}

pub(crate) async fn api_log<R>(ctx: &str, req: R) -> Option<<R::Payload as Payload>::Output>
where
    R: Request + HasPayload,
{
    match req.send().await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("API call failed ({ctx}): {e:?}");
            None
        }
    }
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(
            |bot: Bot, state: Arc<AppState>, msg: Message| async move {
                if let Err(e) = handle_message(&bot, &state, &msg).await {
                    warn!("message handler failed: {e:?}");
                }
                Ok(())
            },
        ))
        .branch(Update::filter_callback_query().endpoint(
            |bot: Bot, state: Arc<AppState>, q: CallbackQuery| async move {
                if let Err(e) = handle_callback(&bot, &state, q).await {
                    warn!("callback handler failed: {e:?}");
                }
                Ok(())
            },
        ))
}

async fn handle_message(bot: &Bot, state: &AppState, msg: &Message) -> Result<()> {
    if let Some(text) = msg.text() {
        if is_command(text, "/start") {
            return cmd_start(bot, state, msg).await;
        }
        if is_command(text, "/stats") {
            return cmd_stats(bot, state, msg).await;
        }
    }
    if msg.photo().is_some() || msg.video().is_some() || msg.video_note().is_some() {
        return handle_media(bot, state, msg).await;
    }
    if msg.text().is_some() {
        return handle_text(bot, state, msg).await;
    }
    Ok(())
}

fn is_command(text: &str, cmd: &str) -> bool {
    let head = text.split_whitespace().next().unwrap_or("");
    head == cmd
        || head
            .strip_prefix(cmd)
            .map(|rest| rest.starts_with('@'))
            .unwrap_or(false)
}

async fn cmd_start(bot: &Bot, state: &AppState, msg: &Message) -> Result<()> {
    let _ = api_log("delete_message", bot.delete_message(msg.chat.id, msg.id)).await;

    let text = "👋 <b>coach bot</b>\n\n\
                📸 <b>rules:</b>\n\
                • photo/video + <code>#meal</code> or <code>#gym</code>\n\
                • <code>#cheat</code> — +1 penalty.\n\n\
                📊 <b>stats:</b> /stats";
    if let Some(sent) = api_log(
        "send_message",
        bot.send_message(msg.chat.id, text).parse_mode(ParseMode::Html),
    )
    .await
    {
        state
            .autodelete
            .schedule(msg.chat.id, sent.id, state.autodelete_secs)
            .await;
    }
    Ok(())
}

async fn cmd_stats(bot: &Bot, state: &AppState, msg: &Message) -> Result<()> {
    let _ = api_log("delete_message", bot.delete_message(msg.chat.id, msg.id)).await;

    if let Some(sent) = api_log(
        "send_message",
        bot.send_message(msg.chat.id, "📊 <b>pick a report period:</b>")
            .parse_mode(ParseMode::Html)
            .reply_markup(stats_keyboard()),
    )
    .await
    {
        state
            .autodelete
            .schedule(msg.chat.id, sent.id, state.autodelete_secs)
            .await;
    }
    Ok(())
}

fn stats_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("today", "stats_today"),
            InlineKeyboardButton::callback("this week", "stats_week"),
        ],
        vec![
            InlineKeyboardButton::callback("this month", "stats_month"),
            InlineKeyboardButton::callback("custom range", "stats_custom"),
        ],
    ])
}

fn moderation_keyboard(sub_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ accept", format!("approve_{sub_id}")),
        InlineKeyboardButton::callback("❌ reject", format!("reject_{sub_id}")),
    ]])
}

/// Map message text onto a submission category via the configured tag lists.
/// Cheat tags win over workout tags, workout over meal, so that "#gym after
/// the #cheat meal" records the cheat.
pub fn classify_text(tags: &TagsConfig, text: &str) -> Option<SubmissionKind> {
    let t = text.to_lowercase();
    let hit = |list: &[String]| list.iter().any(|tag| t.contains(&tag.to_lowercase()));
    if hit(&tags.cheat) {
        return Some(SubmissionKind::Cheat);
    }
    if hit(&tags.workout) {
        return Some(SubmissionKind::Workout);
    }
    if hit(&tags.meal) {
        return Some(SubmissionKind::Meal);
    }
    None
}

async fn handle_media(bot: &Bot, state: &AppState, msg: &Message) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    // Media from untracked senders is ignored entirely.
    let Some(user) = state.store.user_by_tg(from.id.0) else {
        return Ok(());
    };

    let (file_id, media) = if let Some(sizes) = msg.photo() {
        let Some(best) = sizes.last() else {
            return Ok(());
        };
        (best.file.id.clone(), MediaKind::Photo)
    } else if let Some(video) = msg.video() {
        (video.file.id.clone(), MediaKind::Video)
    } else if let Some(note) = msg.video_note() {
        (note.file.id.clone(), MediaKind::VideoNote)
    } else {
        return Ok(());
    };

    match classify_text(&state.tags, msg.caption().unwrap_or("")) {
        Some(kind) => {
            process_submission(bot, state, &user, file_id, media, kind, msg.chat.id, msg.id).await
        }
        None => {
            // No tag yet: park it and wait for a follow-up tag message.
            state.pending_media.insert(
                from.id,
                PendingMedia {
                    file_id,
                    media,
                    message_id: msg.id,
                    at: Utc::now(),
                },
            );
            Ok(())
        }
    }
}

async fn handle_text(bot: &Bot, state: &AppState, msg: &Message) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if state.awaiting_range.remove(&from.id).is_some() {
        let _ = api_log("delete_message", bot.delete_message(msg.chat.id, msg.id)).await;
        match parse_range(text) {
            Ok((d1, d2)) => {
                let title = format!("report: {} - {}", d1.format("%d.%m.%Y"), d2.format("%d.%m.%Y"));
                let start = DateTime::from_naive_utc_and_offset(d1.and_hms_opt(0, 0, 0).unwrap(), Utc);
                let end = DateTime::from_naive_utc_and_offset(d2.and_hms_opt(0, 0, 0).unwrap(), Utc);
                send_stats_report(bot, state, msg.chat.id, start, end, &title).await?;
            }
            Err(e) => {
                warn!("rejected custom range {text:?}: {e:#}");
                if let Some(sent) = api_log(
                    "send_message",
                    bot.send_message(msg.chat.id, "⚠️ bad format. expected: DD.MM.YYYY - DD.MM.YYYY"),
                )
                .await
                {
                    state
                        .autodelete
                        .schedule(msg.chat.id, sent.id, state.autodelete_secs)
                        .await;
                }
            }
        }
        return Ok(());
    }

    let Some(kind) = classify_text(&state.tags, text) else {
        return Ok(());
    };
    let Some((_, pending)) = state.pending_media.remove(&from.id) else {
        return Ok(());
    };
    if Utc::now() - pending.at > chrono::Duration::seconds(state.pending_media_ttl_secs as i64) {
        return Ok(());
    }
    let Some(user) = state.store.user_by_tg(from.id.0) else {
        return Ok(());
    };

    process_submission(
        bot,
        state,
        &user,
        pending.file_id,
        pending.media,
        kind,
        msg.chat.id,
        pending.message_id,
    )
    .await?;
    let _ = api_log("delete_message", bot.delete_message(msg.chat.id, msg.id)).await;
    Ok(())
}

/// "DD.MM.YYYY - DD.MM.YYYY", whitespace-insensitive.
pub fn parse_range(text: &str) -> Result<(NaiveDate, NaiveDate)> {
    let raw: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let (a, b) = raw.split_once('-').context("missing '-' separator")?;
    let d1 = NaiveDate::parse_from_str(a, "%d.%m.%Y").context("bad start date")?;
    let d2 = NaiveDate::parse_from_str(b, "%d.%m.%Y").context("bad end date")?;
    Ok((d1, d2))
}

#[allow(clippy::too_many_arguments)]
async fn process_submission(
    bot: &Bot,
    state: &AppState,
    user: &User,
    file_id: String,
    media: MediaKind,
    kind: SubmissionKind,
    chat_id: ChatId,
    reply_to: MessageId,
) -> Result<()> {
    let sub_id = state
        .store
        .add_submission(user.id, kind, file_id.clone(), media, Utc::now());
    state.store.persist_async().await;

    let (emoji, label) = match kind {
        SubmissionKind::Cheat => ("🍔", "cheat meal (+1 penalty)"),
        SubmissionKind::Meal => ("🥗", "meal"),
        SubmissionKind::Workout | SubmissionKind::VideoNote => ("🏋️", "workout"),
    };
    let caption = format!(
        "{REVIEW_HEADER}\n<b>{emoji} @{} | {label}</b>\n🕓 <i>{}</i>",
        escape(&user.name),
        Utc::now().format("%H:%M"),
    );
    let keyboard = moderation_keyboard(sub_id);

    let sent = match media {
        MediaKind::Photo => {
            api_log(
                "send_photo",
                bot.send_photo(chat_id, InputFile::file_id(file_id))
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboard)
                    .reply_parameters(reply_params(reply_to)),
            )
            .await
        }
        MediaKind::Video => {
            api_log(
                "send_video",
                bot.send_video(chat_id, InputFile::file_id(file_id))
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboard)
                    .reply_parameters(reply_params(reply_to)),
            )
            .await
        }
        MediaKind::VideoNote => {
            // Video notes cannot carry captions; echo the note, then hang the
            // review card off it.
            let note = api_log(
                "send_video_note",
                bot.send_video_note(chat_id, InputFile::file_id(file_id))
                    .reply_parameters(reply_params(reply_to)),
            )
            .await;
            let card_anchor = match &note {
                Some(note) => {
                    state
                        .autodelete
                        .schedule(chat_id, note.id, state.autodelete_secs)
                        .await;
                    note.id
                }
                None => reply_to,
            };
            api_log(
                "send_message",
                bot.send_message(chat_id, caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboard)
                    .reply_parameters(reply_params(card_anchor)),
            )
            .await
        }
    };

    if let Some(sent) = sent {
        state
            .autodelete
            .schedule(chat_id, sent.id, state.autodelete_secs)
            .await;
    }
    info!("queued submission {sub_id} ({kind:?}) from {}", user.tg_id);
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Verdict {
    Accept,
    Reject,
}

async fn handle_callback(bot: &Bot, state: &AppState, q: CallbackQuery) -> Result<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    if let Some(raw) = data.strip_prefix("approve_") {
        return moderate(bot, state, q, raw, Verdict::Accept).await;
    }
    if let Some(raw) = data.strip_prefix("reject_") {
        return moderate(bot, state, q, raw, Verdict::Reject).await;
    }

    match data.as_str() {
        "stats_today" | "stats_week" | "stats_month" => {
            let period = match data.as_str() {
                "stats_today" => StatsPeriod::Today,
                "stats_week" => StatsPeriod::Week,
                _ => StatsPeriod::Month,
            };
            let chat_id = q.message.as_ref().map(|m| m.chat().id).unwrap_or(state.group_id);
            if let Some(m) = q.message.as_ref() {
                let _ = api_log("delete_message", bot.delete_message(m.chat().id, m.id())).await;
            }
            let _ = api_log("answer_callback_query", bot.answer_callback_query(q.id)).await;

            let (start, end, title) = period_window(period, Utc::now());
            send_stats_report(bot, state, chat_id, start, end, &title).await?;
        }
        "stats_custom" => {
            state.awaiting_range.insert(q.from.id, Utc::now());
            if let Some(m) = q.message.as_ref() {
                let _ = api_log(
                    "edit_message_text",
                    bot.edit_message_text(
                        m.chat().id,
                        m.id(),
                        "📅 format: <code>DD.MM.YYYY - DD.MM.YYYY</code>",
                    )
                    .parse_mode(ParseMode::Html),
                )
                .await;
            }
            let _ = api_log("answer_callback_query", bot.answer_callback_query(q.id)).await;
        }
        _ => {
            let _ = api_log("answer_callback_query", bot.answer_callback_query(q.id)).await;
        }
    }
    Ok(())
}

async fn moderate(
    bot: &Bot,
    state: &AppState,
    q: CallbackQuery,
    raw_id: &str,
    verdict: Verdict,
) -> Result<()> {
    let Ok(sub_id) = raw_id.parse::<i64>() else {
        let _ = api_log("answer_callback_query", bot.answer_callback_query(q.id)).await;
        return Ok(());
    };

    let applied = match verdict {
        Verdict::Accept => state.store.verify_submission(sub_id),
        Verdict::Reject => state.store.delete_submission(sub_id),
    };

    if applied {
        state.store.persist_async().await;
        let moderator = escape(&q.from.first_name);
        if let Some(card) = q.message.as_ref().and_then(|m| m.regular_message()) {
            let original = card.caption().or_else(|| card.text()).unwrap_or("");
            let body = escape(card_body(original));
            let new_text = match verdict {
                Verdict::Accept => format!("✅ <b>accepted</b>\n{body}\n(approved by: {moderator})"),
                Verdict::Reject => format!("❌ <b>rejected</b>\n{body}\n(rejected by: {moderator})"),
            };
            if card.caption().is_some() {
                let _ = api_log(
                    "edit_message_caption",
                    bot.edit_message_caption(card.chat.id, card.id)
                        .caption(new_text)
                        .parse_mode(ParseMode::Html),
                )
                .await;
            } else {
                let _ = api_log(
                    "edit_message_text",
                    bot.edit_message_text(card.chat.id, card.id, new_text)
                        .parse_mode(ParseMode::Html),
                )
                .await;
            }
        }
        info!("submission {sub_id} {verdict:?} by {}", q.from.id);
    }

    let _ = api_log("answer_callback_query", bot.answer_callback_query(q.id)).await;
    Ok(())
}

/// Reply to a message that may already be gone by the time we send.
fn reply_params(message_id: MessageId) -> ReplyParameters {
    ReplyParameters {
        message_id,
        chat_id: None,
        allow_sending_without_reply: Some(true),
        quote: None,
        quote_parse_mode: None,
        quote_entities: None,
        quote_position: None,
    }
}

/// Drop the "for review:" header, keep the submission line(s).
fn card_body(text: &str) -> &str {
    text.split_once('\n').map(|(_, rest)| rest).unwrap_or(text)
}

#[derive(Debug, Clone, Copy)]
pub enum StatsPeriod {
    Today,
    Week,
    Month,
}

pub fn period_window(period: StatsPeriod, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>, String) {
    match period {
        StatsPeriod::Today => (now, now, format!("report for {}", now.format("%d.%m"))),
        StatsPeriod::Week => {
            let days_in = now.date_naive().weekday().num_days_from_monday() as i64;
            (
                now - chrono::Duration::days(days_in),
                now,
                "report for the week".to_string(),
            )
        }
        StatsPeriod::Month => {
            let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
            (
                DateTime::from_naive_utc_and_offset(first.and_hms_opt(0, 0, 0).unwrap(), Utc),
                now,
                format!("report for {}", now.format("%B")),
            )
        }
    }
}

/// Membership refresh: the one write step before the pure report build.
/// Left/kicked members and resolver failures drop out of the report; changed
/// display names are written back and committed once, after the loop.
pub async fn refresh_active_members(bot: &Bot, state: &AppState) -> Vec<ActiveMember> {
    let mut active = Vec::new();
    let mut renamed = false;

    for user in state.store.users() {
        let member = match bot
            .get_chat_member(state.group_id, UserId(user.tg_id))
            .send()
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!("membership lookup failed for {}: {e:?}", user.tg_id);
                continue;
            }
        };
        if member.kind.is_left() || member.kind.is_banned() {
            continue;
        }

        let name = member.user.full_name();
        if name != user.name && state.store.update_name(user.id, &name) {
            renamed = true;
        }
        active.push(ActiveMember {
            user_id: user.id,
            name,
            policy: state.policy_for(user.tg_id),
        });
    }

    if renamed {
        state.store.persist_async().await;
    }
    active
}

fn render_report_text(title: &str, report: &BTreeMap<String, UserReport>) -> String {
    let mut blocks = vec![format!("📅 <b>{title}</b>\n")];
    for (name, r) in report {
        blocks.push(format!(
            "👤 <b>{}</b>:\n   \
             🥗 meals: <b>{}</b> | 🏋️ gym: <b>{}</b>\n   \
             ⚠️ penalties: <b>{}</b>{}\n   \
             📝 <i>reasons:</i> {}",
            escape(name),
            r.total_meals,
            r.total_workouts,
            r.total_penalty,
            r.note,
            r.reasons,
        ));
    }
    blocks.join("\n\n")
}

pub async fn send_stats_report(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    title: &str,
) -> Result<()> {
    let loading = api_log(
        "send_message",
        bot.send_message(chat_id, "🔄 crunching the numbers..."),
    )
    .await;

    let members = refresh_active_members(bot, state).await;
    let report = stats::build_report(&state.store, &members, start, end);

    if let Some(m) = loading {
        let _ = api_log("delete_message", bot.delete_message(chat_id, m.id)).await;
    }

    if report.is_empty() {
        if let Some(sent) = api_log("send_message", bot.send_message(chat_id, "no data yet.")).await
        {
            state
                .autodelete
                .schedule(chat_id, sent.id, state.autodelete_secs)
                .await;
        }
        return Ok(());
    }

    let text = render_report_text(title, &report);
    let bars = chart::render_penalty_bars(&stats::penalty_series(&report));
    let chart_block = format!("<pre>{}</pre>", escape(&bars));
    let full = format!("{text}\n\n{chart_block}");

    let mut parts = Vec::new();
    if full.chars().count() > SPLIT_THRESHOLD_CHARS {
        parts.push(format!("📅 <b>{title}</b> (details below)\n{chart_block}"));
        parts.push(text);
    } else {
        parts.push(full);
    }

    for part in parts {
        if let Some(sent) = api_log(
            "send_message",
            bot.send_message(chat_id, part).parse_mode(ParseMode::Html),
        )
        .await
        {
            state
                .autodelete
                .schedule(chat_id, sent.id, state.autodelete_secs)
                .await;
        }
    }
    Ok(())
}

/// Expire parked media and stale custom-range prompts.
pub async fn session_prune_task(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SESSION_PRUNE_TICK_SECS));
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => { break; }
            _ = ticker.tick() => {
                let now = Utc::now();
                let ttl = chrono::Duration::seconds(state.pending_media_ttl_secs as i64);
                state.pending_media.retain(|_, p| now - p.at <= ttl);
                state.awaiting_range.retain(|_, at| now - *at <= ttl);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classification_prefers_cheat_then_workout() {
        let tags = TagsConfig::default();
        assert_eq!(
            classify_text(&tags, "post-#gym #cheat snack"),
            Some(SubmissionKind::Cheat)
        );
        assert_eq!(
            classify_text(&tags, "#meal right after #workout"),
            Some(SubmissionKind::Workout)
        );
        assert_eq!(classify_text(&tags, "lunch #meal"), Some(SubmissionKind::Meal));
        assert_eq!(classify_text(&tags, "no hashtags here"), None);
    }

    #[test]
    fn classification_is_case_insensitive() {
        let tags = TagsConfig::default();
        assert_eq!(classify_text(&tags, "#MEAL"), Some(SubmissionKind::Meal));
        assert_eq!(classify_text(&tags, "#Gym done"), Some(SubmissionKind::Workout));
    }

    #[test]
    fn range_parsing_is_whitespace_insensitive() {
        let (d1, d2) = parse_range(" 01.02.2024 -  29.02.2024 ").unwrap();
        assert_eq!(d1, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(d2, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (d1, d2) = parse_range("05.03.2024-05.03.2024").unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn range_parsing_rejects_garbage() {
        assert!(parse_range("yesterday to today").is_err());
        assert!(parse_range("01.02.2024").is_err());
        assert!(parse_range("32.01.2024-01.02.2024").is_err());
    }

    #[test]
    fn command_matching_allows_bot_suffix() {
        assert!(is_command("/stats", "/stats"));
        assert!(is_command("/stats@coach_bot", "/stats"));
        assert!(!is_command("/statsx", "/stats"));
        assert!(!is_command("see /stats", "/stats"));
    }

    #[test]
    fn card_body_strips_the_header_only() {
        let card = "for review:\n<b>🥗 @ann | meal</b>\n🕓 12:30";
        assert_eq!(card_body(card), "<b>🥗 @ann | meal</b>\n🕓 12:30");
        assert_eq!(card_body("single line"), "single line");
    }

    #[test]
    fn week_window_starts_on_monday() {
        // 2024-05-15 is a Wednesday.
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
        let (start, end, _) = period_window(StatsPeriod::Week, now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!(end, now);
    }

    #[test]
    fn month_window_starts_on_the_first() {
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
        let (start, end, title) = period_window(StatsPeriod::Month, now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(end, now);
        assert!(title.contains("May"));
    }

    #[test]
    fn today_window_is_degenerate() {
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
        let (start, end, title) = period_window(StatsPeriod::Today, now);
        assert_eq!(start, end);
        assert!(title.contains("15.05"));
    }

    #[test]
    fn report_text_escapes_names() {
        let mut report = BTreeMap::new();
        report.insert(
            "ann <3".to_string(),
            UserReport {
                total_penalty: 2,
                total_meals: 4,
                total_workouts: 1,
                reasons: "none".to_string(),
                note: String::new(),
            },
        );
        let text = render_report_text("report", &report);
        assert!(text.contains("ann &lt;3"));
        assert!(text.contains("penalties: <b>2</b>"));
        assert!(!text.contains("ann <3"));
    }
}
