//! Extraction of the action request embedded in a model reply.
//!
//! The model is asked to prefix command replies with
//!
//! ```text
//! [AÇÃO: ABRIR_PROGRAMA]
//! [PARAM: chrome]
//! Abrindo o Chrome, senhor.
//! ```
//!
//! Parsing is total: any string yields an [`ActionRequest`].  Replies without
//! a usable action tag become `NENHUMA` with the whole text as speech.

use std::sync::LazyLock;

use regex::Regex;

use crate::actions::{ActionRequest, NO_ACTION};

static ACTION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*(?:AÇÃO|ACAO|ACTION)\s*:\s*([^\]]*)\]\s*").expect("valid regex")
});

static PARAM_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\s*PARAM\s*:\s*([^\]]*)\]\s*").expect("valid regex"));

/// Parse a raw reply into kind, parameter and speech.
///
/// ```rust
/// use jarvis_voice::llm::parse_response;
///
/// let req = parse_response("[ACTION: ABRIR_PROGRAMA][PARAM: chrome] Abrindo, senhor.");
/// assert_eq!(req.kind, "ABRIR_PROGRAMA");
/// assert_eq!(req.parameter.as_deref(), Some("chrome"));
/// assert_eq!(req.speech, "Abrindo, senhor.");
/// ```
pub fn parse_response(reply: &str) -> ActionRequest {
    let kind = ACTION_TAG
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_uppercase())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| NO_ACTION.to_string());

    let parameter = PARAM_TAG
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty());

    let without_actions = ACTION_TAG.replace_all(reply, "");
    let speech = PARAM_TAG
        .replace_all(&without_actions, "")
        .trim()
        .to_string();

    ActionRequest {
        kind,
        parameter,
        speech,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_tag_on_one_line() {
        let req = parse_response("[ACTION: ABRIR_PROGRAMA][PARAM: chrome] Abrindo, senhor.");
        assert_eq!(req.kind, "ABRIR_PROGRAMA");
        assert_eq!(req.parameter.as_deref(), Some("chrome"));
        assert_eq!(req.speech, "Abrindo, senhor.");
    }

    #[test]
    fn portuguese_tags_on_separate_lines() {
        let reply = "[AÇÃO: VOLUME]\n[PARAM: aumentar 10]\nVolume ajustado, senhor.";
        let req = parse_response(reply);
        assert_eq!(req.kind, "VOLUME");
        assert_eq!(req.parameter.as_deref(), Some("aumentar 10"));
        assert_eq!(req.speech, "Volume ajustado, senhor.");
    }

    #[test]
    fn tag_names_and_kinds_are_case_insensitive() {
        let req = parse_response("[ação:  abrir_site ] [param: github.com] Feito.");
        assert_eq!(req.kind, "ABRIR_SITE");
        assert_eq!(req.parameter.as_deref(), Some("github.com"));
        assert_eq!(req.speech, "Feito.");

        let req = parse_response("[Acao: midia][PARAM: pause] Pausado.");
        assert_eq!(req.kind, "MIDIA");
    }

    #[test]
    fn no_tags_is_no_action_with_full_speech() {
        let req = parse_response("  Roma foi fundada em 753 a.C., senhor. ");
        assert_eq!(req.kind, NO_ACTION);
        assert!(req.parameter.is_none());
        assert_eq!(req.speech, "Roma foi fundada em 753 a.C., senhor.");
    }

    #[test]
    fn empty_reply() {
        let req = parse_response("");
        assert_eq!(req.kind, NO_ACTION);
        assert!(req.parameter.is_none());
        assert!(req.speech.is_empty());
    }

    #[test]
    fn empty_tags_are_absent() {
        let req = parse_response("[AÇÃO: ] [PARAM:   ] Certo.");
        assert_eq!(req.kind, NO_ACTION);
        assert!(req.parameter.is_none());
        assert_eq!(req.speech, "Certo.");
    }

    #[test]
    fn first_tag_of_each_kind_wins_and_all_are_stripped() {
        let reply = "[AÇÃO: MIDIA][PARAM: play] Tocando. [AÇÃO: VOLUME][PARAM: mudo] Pronto.";
        let req = parse_response(reply);
        assert_eq!(req.kind, "MIDIA");
        assert_eq!(req.parameter.as_deref(), Some("play"));
        assert_eq!(req.speech, "Tocando. Pronto.");
    }

    #[test]
    fn malformed_tag_is_left_in_speech() {
        let req = parse_response("[AÇÃO ABRIR_PROGRAMA sem fechar");
        assert_eq!(req.kind, NO_ACTION);
        assert_eq!(req.speech, "[AÇÃO ABRIR_PROGRAMA sem fechar");
    }

    #[test]
    fn unknown_kind_is_passed_through() {
        let req = parse_response("[AÇÃO: INFO_CLIMA] Está ensolarado.");
        assert_eq!(req.kind, "INFO_CLIMA");
        assert_eq!(req.speech, "Está ensolarado.");
    }

    #[test]
    fn param_without_action() {
        let req = parse_response("[PARAM: chrome] Hum.");
        assert_eq!(req.kind, NO_ACTION);
        assert_eq!(req.parameter.as_deref(), Some("chrome"));
        assert_eq!(req.speech, "Hum.");
    }

    #[test]
    fn tags_only_gives_empty_speech() {
        let req = parse_response("[AÇÃO: INFO_HORA]");
        assert_eq!(req.kind, "INFO_HORA");
        assert!(req.speech.is_empty());
    }
}
