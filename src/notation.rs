/// Portable game notation payload and text helpers
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One chess game or position in portable game notation.
///
/// Always stored trimmed; an empty payload cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotationPayload(String);

impl NotationPayload {
    pub fn new(text: &str) -> Option<NotationPayload> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(NotationPayload(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a synthesized single-position stub rather than a full game.
    pub fn is_position_stub(&self) -> bool {
        let movetext = self.0.rsplit("\n\n").next().unwrap_or_default();
        self.0.contains("[SetUp \"1\"]") && movetext.trim() == "*"
    }
}

fn notation_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(\[[A-Za-z]+\s+"|1\.(\.\.)?\s*[A-Za-z])"#).expect("static regex")
    })
}

fn noise_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*\[(Annotator|PlyCount)\s+"[^"]*"\][ \t]*\r?\n?"#)
            .expect("static regex")
    })
}

fn fen_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([pnbrqkPNBRQK1-8]{1,8}/){7}[pnbrqkPNBRQK1-8]{1,8}\s+[wb](\s|$)")
            .expect("static regex")
    })
}

/// Text begins with a tag pair marker or a first move number.
pub fn looks_like_notation(text: &str) -> bool {
    notation_start().is_match(text.trim_start())
}

/// Drop annotator and ply-count tag lines that download links append.
pub fn strip_noise_tags(text: &str) -> String {
    noise_tag().replace_all(text, "").trim().to_string()
}

pub fn looks_like_fen(text: &str) -> bool {
    fen_shape().is_match(text.trim())
}

/// PGN date field: `YYYY.MM.DD`
pub fn format_pgn_date(year: u32, month: u32, day: u32) -> String {
    format!("{:04}.{:02}.{:02}", year, month, day)
}

/// Minimal notation for a lone position: placeholder roster, open result.
pub fn position_stub(fen: &str, date: &str) -> NotationPayload {
    let fen = fen.trim();
    NotationPayload(format!(
        "[Event \"?\"]\n\
         [Site \"?\"]\n\
         [Date \"{date}\"]\n\
         [Round \"?\"]\n\
         [White \"?\"]\n\
         [Black \"?\"]\n\
         [Result \"*\"]\n\
         [SetUp \"1\"]\n\
         [FEN \"{fen}\"]\n\
         \n\
         *"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

    #[test]
    fn test_payload_trims_and_rejects_empty() {
        assert_eq!(NotationPayload::new("  1. e4 *\n").unwrap().as_str(), "1. e4 *");
        assert!(NotationPayload::new("   \n\t").is_none());
        assert!(NotationPayload::new("").is_none());
    }

    #[test]
    fn test_looks_like_notation() {
        assert!(looks_like_notation("[Event \"Casual\"]\n1. e4 e5 *"));
        assert!(looks_like_notation("  1. d4 d5 2. c4 *"));
        assert!(looks_like_notation("1.e4 c5"));
        assert!(looks_like_notation("1... e5 2. Nf3"));
        assert!(!looks_like_notation("Download PGN"));
        assert!(!looks_like_notation("12 moves"));
        assert!(!looks_like_notation(""));
    }

    #[test]
    fn test_strip_noise_tags() {
        let raw = "[Event \"Live\"]\n[Annotator \"bot\"]\n[PlyCount \"2\"]\n[Result \"*\"]\n\n1. e4 e5 *";
        assert_eq!(strip_noise_tags(raw), "[Event \"Live\"]\n[Result \"*\"]\n\n1. e4 e5 *");
    }

    #[test]
    fn test_strip_noise_tags_keeps_other_tags() {
        let raw = "[White \"Annotator\"]\n1. e4 *";
        assert_eq!(strip_noise_tags(raw), raw);
    }

    #[test]
    fn test_looks_like_fen() {
        assert!(looks_like_fen(START_FEN));
        assert!(looks_like_fen("8/8/8/8/8/8/8/K6k w"));
        assert!(!looks_like_fen("not a fen"));
        assert!(!looks_like_fen("8/8/8/8/8/8/8 w - - 0 1"));
    }

    #[test]
    fn test_position_stub() {
        let stub = position_stub(START_FEN, &format_pgn_date(2026, 3, 7));

        assert!(stub.as_str().contains(&format!("[FEN \"{}\"]", START_FEN)));
        assert!(stub.as_str().contains("[Result \"*\"]"));
        assert!(stub.as_str().contains("[Date \"2026.03.07\"]"));
        assert!(stub.as_str().contains("[White \"?\"]"));
        assert!(stub.as_str().ends_with("\n\n*"));
        assert!(looks_like_notation(stub.as_str()));
        assert!(stub.is_position_stub());
    }

    #[test]
    fn test_full_game_is_not_stub() {
        let game = NotationPayload::new("[Event \"Test\"]\n1. e4 e5 *").unwrap();
        assert!(!game.is_position_stub());
    }
}
