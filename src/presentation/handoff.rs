//! Deciding whether a result can be handed off to WhatsApp, and recovering
//! the `wa.me` link for it.
//!
//! The backend is supposed to send the link in `whatsapp_url`. Older backends
//! only mention it somewhere in the message text, so the text is scraped as a
//! fallback: first for a literal link, then for loose `phone`/`text` pieces.
//! If both fail the caller may ask the backend to extract it.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::backend::CommandResult;

pub const HANDOFF_MARKER: &str = "whatsapp";

const HANDOFF_HOSTS: [&str; 2] = ["wa.me", "api.whatsapp.com"];

static LITERAL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://wa\.me/\+?\d+(?:\?[^\s"'<>)\]]*)?"#).expect("valid regex")
});
static PHONE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bphone["']?\s*[:=]\s*["']?\+?(\d{6,15})"#).expect("valid regex")
});
static TEXT_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btext["']?\s*[:=]\s*["']?([^&"'\s]+)"#).expect("valid regex")
});

/// Successful, error free and produced by (or aimed at) the WhatsApp agent.
/// Says nothing about whether a link can actually be found.
#[must_use]
pub fn is_candidate(result: &CommandResult) -> bool {
    let mentions_marker = |s: &str| s.to_lowercase().contains(HANDOFF_MARKER);
    result.success
        && result.error_message().is_none()
        && (mentions_marker(&result.agent_used) || mentions_marker(&result.intent))
}

/// Everything that does not need a round-trip, in order of preference.
#[must_use]
pub fn recover_link(result: &CommandResult) -> Option<String> {
    result
        .explicit_handoff_link()
        .and_then(validate)
        .or_else(|| literal_link(&result.message))
        .or_else(|| reconstruct_link(&result.message))
}

/// Accepts only https links to WhatsApp hosts.
#[must_use]
pub fn validate(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    let host_ok = url.host_str().is_some_and(|host| HANDOFF_HOSTS.contains(&host));
    (url.scheme() == "https" && host_ok).then(|| url.to_string())
}

fn literal_link(message: &str) -> Option<String> {
    let found = LITERAL_LINK.find(message)?;
    let link = found.as_str().trim_end_matches(['.', ',', ';', '!']);
    validate(link)
}

fn reconstruct_link(message: &str) -> Option<String> {
    let phone = PHONE_PART.captures(message)?.get(1)?.as_str();
    let raw_text = TEXT_PART.captures(message)?.get(1)?.as_str();

    // the text piece usually comes out of a query string already encoded
    let text = url::form_urlencoded::parse(format!("text={raw_text}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())?;

    let mut url = Url::parse(&format!("https://wa.me/{phone}")).ok()?;
    url.query_pairs_mut().append_pair("text", &text);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use crate::executor::tests::result;

    use super::*;

    #[test]
    fn candidate_needs_success_no_error_and_marker() {
        assert!(is_candidate(&result("WhatsAppAgent", "send", "ok")));
        assert!(is_candidate(&result("MessagingAgent", "WHATSAPP_send", "ok")));
        assert!(!is_candidate(&result("CalendarAgent", "calendar", "ok")));

        let mut failed = result("WhatsAppAgent", "whatsapp_send", "ok");
        failed.success = false;
        assert!(!is_candidate(&failed));

        let mut errored = result("WhatsAppAgent", "whatsapp_send", "ok");
        errored.error = Some("contact not found".to_owned());
        assert!(!is_candidate(&errored));
    }

    #[test]
    fn literal_link_in_message_wins() {
        let r = result(
            "WhatsAppAgent",
            "whatsapp_send",
            "Message ready: https://wa.me/15551234567?text=running%20late",
        );
        assert_eq!(
            recover_link(&r).as_deref(),
            Some("https://wa.me/15551234567?text=running%20late")
        );
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_the_link() {
        assert_eq!(
            literal_link("Open (https://wa.me/4912345678?text=hi).").as_deref(),
            Some("https://wa.me/4912345678?text=hi")
        );
    }

    #[test]
    fn explicit_field_is_preferred() {
        let mut r = result(
            "WhatsAppAgent",
            "whatsapp_send",
            "Old link https://wa.me/111111111?text=old",
        );
        r.whatsapp_url = Some("https://wa.me/222222222?text=new".to_owned());
        assert_eq!(recover_link(&r).as_deref(), Some("https://wa.me/222222222?text=new"));
    }

    #[test]
    fn explicit_field_pointing_elsewhere_falls_back_to_text() {
        let mut r = result(
            "WhatsAppAgent",
            "whatsapp_send",
            "Ready: https://wa.me/15551234567?text=hi",
        );
        r.whatsapp_url = Some("javascript:alert(1)".to_owned());
        assert_eq!(recover_link(&r).as_deref(), Some("https://wa.me/15551234567?text=hi"));
    }

    #[test]
    fn reconstructs_from_phone_and_text_pieces() {
        let r = result(
            "WhatsAppAgent",
            "whatsapp_send",
            "Prepared https://api.whatsapp.com/send?phone=15551234567&text=running%20late",
        );
        assert_eq!(
            recover_link(&r).as_deref(),
            Some("https://wa.me/15551234567?text=running+late")
        );

        let json_ish = result(
            "WhatsAppAgent",
            "whatsapp_send",
            r#"{"phone": "+4912345678", "text": "hello"}"#,
        );
        assert_eq!(
            recover_link(&json_ish).as_deref(),
            Some("https://wa.me/4912345678?text=hello")
        );
    }

    #[test]
    fn nothing_recoverable() {
        let r = result("WhatsAppAgent", "whatsapp_send", "Message sent to Mom");
        assert!(recover_link(&r).is_none());

        let phone_only = result("WhatsAppAgent", "whatsapp_send", "phone=15551234567");
        assert!(recover_link(&phone_only).is_none());
    }

    #[test]
    fn keys_must_be_whole_words() {
        for message in [
            "context: lunch phone=15551234567",
            "subtext=hello phone=15551234567",
            "telephone=15551234567 text=hello",
        ] {
            let r = result("WhatsAppAgent", "whatsapp_send", message);
            assert!(recover_link(&r).is_none(), "{message}");
        }
    }
}
