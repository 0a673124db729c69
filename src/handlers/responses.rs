use tracing::{info, warn};

use crate::error::BotError;
use crate::handlers::EventContext;
use crate::line::{Affordance, Messenger, OutboundText};
use crate::state::AppState;

/// Splits `text` into segments of at most `limit` chars, preferring a line
/// break in the back half of each window.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut segments = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > limit {
        let cut = remaining
            .char_indices()
            .nth(limit)
            .map(|(index, _)| index)
            .unwrap_or(remaining.len());
        let window = &remaining[..cut];

        let split = match window.rfind('\n') {
            Some(pos) if pos > 0 && window[..pos].chars().count() >= limit / 2 => pos,
            _ => cut,
        };

        segments.push(remaining[..split].to_string());
        remaining = remaining[split..].trim_start();
    }

    if !remaining.is_empty() {
        segments.push(remaining.to_string());
    }
    segments
}

/// Sends `text` through the single-use reply token, overflowing into push
/// messages addressed to `sender`. Without a sender the overflow is dropped.
/// The affordance rides on the last segment actually delivered.
pub async fn deliver(
    messenger: &dyn Messenger,
    reply_token: &str,
    text: &str,
    sender: Option<&str>,
    affordance: Affordance,
    limit: usize,
) -> Result<(), BotError> {
    let segments = split_message(text, limit);
    let Some((first, rest)) = segments.split_first() else {
        warn!("Refusing to send an empty message");
        return Ok(());
    };

    if rest.is_empty() {
        return messenger
            .reply(reply_token, &OutboundText::new(first.as_str(), affordance))
            .await;
    }

    info!(segments = segments.len(), "message exceeds {limit} chars; splitting");
    let Some(user_id) = sender else {
        warn!(
            dropped = rest.len(),
            "no sender identity; overflow segments cannot be pushed"
        );
        return messenger
            .reply(reply_token, &OutboundText::new(first.as_str(), affordance))
            .await;
    };

    messenger
        .reply(reply_token, &OutboundText::new(first.as_str(), Affordance::None))
        .await?;

    let last = rest.len() - 1;
    for (index, segment) in rest.iter().enumerate() {
        let segment_affordance = if index == last { affordance } else { Affordance::None };
        if let Err(err) = messenger
            .push(user_id, &OutboundText::new(segment.as_str(), segment_affordance))
            .await
        {
            warn!("Failed to push segment {}/{}: {err}", index + 2, segments.len());
        }
    }
    Ok(())
}

/// Replies for one event; delivery failures are logged, never raised.
pub async fn respond(state: &AppState, ctx: &EventContext, text: &str, affordance: Affordance) {
    if let Err(err) = deliver(
        state.messenger.as_ref(),
        &ctx.reply_token,
        text,
        ctx.sender(),
        affordance,
        state.settings.max_message_length,
    )
    .await
    {
        warn!(user_id = %ctx.user_id, "Failed to deliver reply: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{FakeMessenger, Sent};

    fn without_whitespace(value: &str) -> String {
        value.split_whitespace().collect()
    }

    #[test]
    fn short_text_is_a_single_segment() {
        assert_eq!(split_message("你好", 10), vec!["你好".to_string()]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn segments_respect_the_limit_and_rebuild_the_text() {
        let samples = [
            "a".repeat(11),
            "龍婆".repeat(40),
            format!("{}\n{}\n{}", "第一段".repeat(5), "第二段".repeat(7), "end"),
            format!("\n\n{}\n  \n{}", "x".repeat(30), "y".repeat(3)),
        ];
        for limit in [1, 2, 5, 10, 17] {
            for text in &samples {
                let segments = split_message(text, limit);
                if text.trim().chars().count() > limit {
                    assert!(segments.len() >= 2, "limit {limit} text {text:?}");
                }
                for segment in &segments {
                    assert!(segment.chars().count() <= limit);
                }
                assert_eq!(without_whitespace(&segments.concat()), without_whitespace(text));
            }
        }
    }

    #[test]
    fn limit_plus_one_always_splits() {
        let text = "好".repeat(11);
        let segments = split_message(&text, 10);
        assert_eq!(segments, vec!["好".repeat(10), "好".to_string()]);
    }

    #[test]
    fn prefers_a_line_break_in_the_back_half() {
        let text = format!("{}\n{}", "a".repeat(7), "b".repeat(6));
        assert_eq!(split_message(&text, 10), vec!["a".repeat(7), "b".repeat(6)]);

        // A break before the halfway mark is ignored.
        let early = format!("{}\n{}", "a".repeat(3), "b".repeat(10));
        let segments = split_message(&early, 10);
        assert_eq!(segments[0], format!("{}\n{}", "a".repeat(3), "b".repeat(6)));
    }

    #[tokio::test]
    async fn overflow_goes_through_push_with_the_affordance_last() {
        let messenger = FakeMessenger::default();
        let text = format!("{}\n{}\n{}", "a".repeat(8), "b".repeat(8), "c".repeat(8));
        deliver(&messenger, "token", &text, Some("U1"), Affordance::Amulet, 10)
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], Sent::reply("token", &"a".repeat(8), Affordance::None));
        assert_eq!(sent[1], Sent::push("U1", &"b".repeat(8), Affordance::None));
        assert_eq!(sent[2], Sent::push("U1", &"c".repeat(8), Affordance::Amulet));
    }

    #[tokio::test]
    async fn overflow_without_a_sender_is_dropped() {
        let messenger = FakeMessenger::default();
        deliver(&messenger, "token", &"z".repeat(25), None, Affordance::Default, 10)
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(sent, vec![Sent::reply("token", &"z".repeat(10), Affordance::Default)]);
    }
}
